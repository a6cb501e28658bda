// HTTP handlers module

mod handle_did;
mod handle_lookup;

use crate::server::config::ServerConfig;
use crate::SharedMirage;

#[derive(Clone)]
pub struct ServerState {
    pub mirage: SharedMirage,
    pub config: ServerConfig,
}

pub use handle_did::*;
pub use handle_lookup::*;
