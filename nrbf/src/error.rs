use std::path::PathBuf;

use miette::Diagnostic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("Cannot open file `{}`", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode `{}`", path.display())]
    #[diagnostic(help("Is this a BinaryFormatter (NRBF) stream?"))]
    Decode {
        path: PathBuf,
        #[source]
        source: nrbf_format::Error,
    },

    #[error("Stream `{}` ends early", path.display())]
    #[diagnostic(help("The stream stops before its MessageEnd record. Was the file cut short?"))]
    Truncated {
        path: PathBuf,
        #[source]
        source: nrbf_format::Error,
    },

    #[error("Cannot write JSON output")]
    Json {
        #[source]
        source: serde_json::Error,
    },
}
