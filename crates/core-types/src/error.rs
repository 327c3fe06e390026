use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("Unrecognised {0}: '{1}'")]
    InvalidInput(String, String),
}
