use crate::server::Config;
use std::fs::File;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unable to read config file {path}: {source}")]
    IO {
        path: String,
        source: std::io::Error,
    },

    #[error("Unable to deserialize config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },

    #[error("Invalid reconciliation config: {0}")]
    Invalid(&'static str),
}

pub fn load(filename: &str) -> Result<Config, Error> {
    let file = File::open(filename).map_err(|source| Error::IO {
        path: filename.to_string(),
        source,
    })?;
    let config: Config = serde_yml::from_reader(file).map_err(|source| Error::Parse {
        path: filename.to_string(),
        source,
    })?;

    // Every proxied rule routes to the auth proxy, so it has to be addressable.
    if config.reconciliation.oathkeeper_svc.is_empty() {
        return Err(Error::Invalid("oathkeeperSvc must not be empty"));
    }
    if config.reconciliation.oathkeeper_svc_port == 0 {
        return Err(Error::Invalid("oathkeeperSvcPort must not be 0"));
    }
    Ok(config)
}
