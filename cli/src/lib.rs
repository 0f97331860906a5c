pub mod config;
mod faultline_cmd;
pub mod frames;

pub use config::FaultlineConfig;
pub use faultline_cmd::{
    ClearArgs, FaultlineCli, FaultlineCommand, IndexArgs, LocalizeArgs, StatusArgs,
};
