pub mod audit;
pub mod blocks;
pub mod cancel;
pub mod config;
pub mod continuation;
pub mod finish;
pub mod overlap;
pub mod paths;
pub mod session;
pub mod transport;
pub mod util;
