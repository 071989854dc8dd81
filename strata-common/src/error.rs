// Copyright 2026 strata Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// Kinds of errors raised by strata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An insertion would exceed the capacity while the strict capacity limit is set.
    CapacityExceeded,
    /// The requested entity cannot be found.
    NotFound,
    /// An argument is malformed or out of its valid domain.
    InvalidArgument,
    /// An object cannot be rebuilt from the bytes of the secondary tier.
    Reconstruction,
    /// Bytes read back from a tier are damaged.
    Corruption,
    /// Config error.
    Config,
    /// External error.
    External,
    /// Unsupported operation.
    Unsupported,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::CapacityExceeded => "Capacity exceeded",
            ErrorKind::NotFound => "Not found",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::Reconstruction => "Reconstruction error",
            ErrorKind::Corruption => "Corruption",
            ErrorKind::Config => "Config error",
            ErrorKind::External => "External error",
            ErrorKind::Unsupported => "Unsupported operation",
        }
    }
}

/// The error returned by every fallible strata operation.
///
/// `Display` prints a single line:
///
/// ```shell
/// Capacity exceeded, context: { capacity: 100, usage: 60, charge: 50 } => insert rejected by strict capacity limit
/// ```
///
/// `Debug` prints the context, the source and the captured backtrace (if any) on separate lines.
/// `{:#?}` falls back to the conventional struct representation.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .field("backtrace", &self.backtrace)
                .finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f, "\nContext:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f, "\nSource:\n  {source:#}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            writeln!(f, "\nBacktrace:\n{backtrace}")?;
        }
        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            let pairs = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, ", context: {{ {pairs} }}")?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// ```rust
    /// # use strata_common::error::{Error, ErrorKind};
    /// let e = Error::new(ErrorKind::InvalidArgument, "unknown option").with_context("key", "capacityy");
    /// assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Attach a key value pair to the error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set the source of the error.
    ///
    /// The source must not have been set before.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the source error to a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }

    /// Whether the error is raised by the strict capacity limit.
    pub fn is_capacity_exceeded(&self) -> bool {
        self.kind == ErrorKind::CapacityExceeded
    }
}

/// Result type for strata.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper constructors.
impl Error {
    /// A [`ErrorKind::CapacityExceeded`] error carrying the accounting that caused it.
    pub fn capacity_exceeded(capacity: usize, usage: usize, charge: usize) -> Self {
        Error::new(ErrorKind::CapacityExceeded, "insert rejected by strict capacity limit")
            .with_context("capacity", capacity)
            .with_context("usage", usage)
            .with_context("charge", charge)
    }

    /// A [`ErrorKind::InvalidArgument`] error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, message)
    }

    /// A [`ErrorKind::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    /// A [`ErrorKind::Reconstruction`] error.
    pub fn reconstruction(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Reconstruction, message)
    }

    /// A [`ErrorKind::Corruption`] error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corruption, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                Error::new(ErrorKind::Corruption, "damaged bytes").with_source(e)
            }
            _ => Error::new(ErrorKind::External, "io error").with_source(e),
        }
    }
}
