//! Call-level errors.

use thiserror::Error;
use upf_dwarf::DwarfError;
use upf_elf::ElfError;

/// Errors that abort the current call.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error(transparent)]
    Dwarf(#[from] DwarfError),
    #[error("engine failed to initialise: {0}")]
    Init(String),
    #[error("unexpected character {0:?} in argument")]
    UnexpectedCharacter(char),
    #[error("unable to parse argument \"{0}\"")]
    BadArgument(String),
    #[error("unable to find type of \"{0}\"")]
    UnknownIdentifier(String),
    #[error("unable to find member \"{member}\" in \"{record}\"")]
    UnknownMember { member: String, record: String },
    #[error("must take pointer (&) of \"{0}\"")]
    NotAPointer(String),
    #[error("\"{0}\" is a void* and cannot be printed")]
    VoidPointer(String),
    #[error("\"{0}\" is not a function and cannot be called")]
    NotAFunction(String),
    #[error("function \"{0}\" does not return a value")]
    VoidCall(String),
    #[error("unknown format specifier \"%{0}\"")]
    UnknownSpecifier(char),
    #[error("unfinished format specifier at the end of the format string")]
    UnfinishedSpecifier,
    #[error("there are more format specifiers than arguments")]
    TooFewArguments,
    #[error("there are more arguments than format specifiers")]
    TooManyArguments,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
