use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "could not determine the project directory; the system probably does not \
         provide a usable $HOME"
    )]
    NoHome,

    #[error("no search path contains a config.lua")]
    NoConfigFound,

    #[error(transparent)]
    Io(#[from] io::Error),
}
