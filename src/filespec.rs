//! Reading requests from files. Allows use of "-" as a way to specify stdin.

use std::fmt;
use std::fs::File;
use std::io::{stdin, Read};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Specifies a file to read a request from.
#[derive(Clone, Debug)]
pub enum FileSpec {
    /// Read from stdin.
    Stdio,
    /// Read from the file at the given path.
    Path(PathBuf),
}

impl fmt::Display for FileSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use FileSpec::*;
        match self {
            Stdio => f.write_str("<stdio>"),
            Path(path) => write!(f, "{:?}", path),
        }
    }
}

impl FileSpec {
    pub fn reader(&self) -> Result<Box<dyn Read>> {
        use FileSpec::*;
        Ok(match self {
            Stdio => Box::new(stdin()),
            Path(path) => Box::new(
                File::open(path).with_context(|| format!("opening {:?} for reading", path))?,
            ),
        })
    }

    pub fn read_to_string(&self) -> Result<String> {
        let mut content = String::new();
        self.reader()?.read_to_string(&mut content)?;
        Ok(content)
    }
}

impl FromStr for FileSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use FileSpec::*;
        if s == "-" {
            Ok(Stdio)
        } else {
            Ok(Path(s.into()))
        }
    }
}
