//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("tracking store error")]
    Store,
    #[display("could not read feed batch: {}", _0.display())]
    Input(#[error(not(source))] PathBuf),
    #[display("could not write output")]
    Output,
    #[display("could not listen for the shutdown signal")]
    Signal,
}
