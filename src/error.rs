use std::fmt;

#[derive(Debug)]
pub enum GalleyError {
    Fetch(String),
    Decompress(String),
    Asset(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for GalleyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalleyError::Fetch(message) => write!(f, "fetch error: {}", message),
            GalleyError::Decompress(message) => write!(f, "decompress error: {}", message),
            GalleyError::Asset(message) => write!(f, "asset error: {}", message),
            GalleyError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            GalleyError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for GalleyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GalleyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GalleyError {
    fn from(value: std::io::Error) -> Self {
        GalleyError::Io(value)
    }
}
