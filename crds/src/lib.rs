mod apirule;
mod virtualservice;

pub use apirule::*;
pub use virtualservice::*;
