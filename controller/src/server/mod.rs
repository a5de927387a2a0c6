pub mod config;

use crate::processing::ReconciliationConfig;
use pingora::server;
use pingora::server::Server;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: server::configuration::ServerConf,
    pub reconciliation: ReconciliationConfig,
}

pub fn new(config: server::configuration::ServerConf) -> Server {
    let opts = pingora::prelude::Opt::default();
    Server::new_with_opt_and_conf(opts, config)
}
