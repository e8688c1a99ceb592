// Copyright 2025 The Debugpod Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Error type shared by the debugpod crates.
//!
//! An [`Error`] carries a [`Code`] and a stack of messages. Each layer a
//! failure passes through adds context with [`ResultExt::err_tip`], so the
//! final message reads from the root cause outwards.

use core::fmt;
use core::num::ParseIntError;

#[macro_export]
macro_rules! make_err {
    ($code:expr, $($arg:tt)+) => {{
        $crate::Error::new($code, format!($($arg)+))
    }};
}

/// Shorthand for [`make_err!`] with [`Code::InvalidArgument`].
#[macro_export]
macro_rules! make_input_err {
    ($($arg:tt)+) => {{
        $crate::make_err!($crate::Code::InvalidArgument, $($arg)+)
    }};
}

/// Returns an [`Code::InvalidArgument`] error from the enclosing function
/// when `$cond` holds.
#[macro_export]
macro_rules! error_if {
    ($cond:expr, $($arg:tt)+) => {{
        if $cond {
            return Err($crate::make_input_err!($($arg)+).into());
        }
    }};
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Error {
    pub code: Code,
    pub messages: Vec<String>,
}

impl Error {
    /// An empty `msg` leaves the message stack empty.
    pub fn new(code: Code, msg: String) -> Self {
        Self {
            code,
            messages: if msg.is_empty() { Vec::new() } else { vec![msg] },
        }
    }

    #[must_use]
    pub fn append<S: ToString>(mut self, msg: S) -> Self {
        self.messages.push(msg.to_string());
        self
    }

    /// Whether the API server reported the object as missing. Cleanup paths
    /// treat this as success.
    pub fn is_not_found(&self) -> bool {
        self.code == Code::NotFound
    }

    pub fn message_string(&self) -> String {
        self.messages.join(" : ")
    }
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages.is_empty() {
            return write!(f, "{:?}", self.code);
        }
        write!(f, "{:?}: {}", self.code, self.message_string())
    }
}

impl From<Code> for Error {
    fn from(code: Code) -> Self {
        Self::new(code, String::new())
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        make_input_err!("{err}")
    }
}

impl From<core::net::AddrParseError> for Error {
    fn from(err: core::net::AddrParseError) -> Self {
        make_input_err!("{err}")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        make_err!(err.kind().into(), "{err}")
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        make_err!(Code::Internal, "{err}")
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        make_input_err!("{err}")
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => make_err!(
                Code::from_http_status(response.code),
                "{} ({})",
                response.message,
                response.reason
            ),
            other => make_err!(Code::Unavailable, "{other}"),
        }
    }
}

/// Adds context to failures of `Result`s and `Option`s.
pub trait ResultExt<T>: Sized {
    /// Appends the message from `tip_fn` and replaces the code. A `None`
    /// starts from an empty [`Code::Internal`] error.
    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        S: ToString,
        F: FnOnce(&Error) -> (Code, S);

    /// Appends the message from `tip_fn`, keeping the code.
    #[inline]
    fn err_tip<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        S: ToString,
        F: FnOnce() -> S,
    {
        self.err_tip_with_code(|e| (e.code, tip_fn()))
    }
}

fn tip<F, S>(mut error: Error, tip_fn: F) -> Error
where
    S: ToString,
    F: FnOnce(&Error) -> (Code, S),
{
    let (code, message) = tip_fn(&error);
    error.code = code;
    error.messages.push(message.to_string());
    error
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    #[inline]
    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        S: ToString,
        F: FnOnce(&Error) -> (Code, S),
    {
        self.map_err(|e| tip(e.into(), tip_fn))
    }
}

impl<T> ResultExt<T> for Option<T> {
    #[inline]
    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        S: ToString,
        F: FnOnce(&Error) -> (Code, S),
    {
        self.ok_or_else(|| tip(Code::Internal.into(), tip_fn))
    }
}

/// Failure categories. The names follow the gRPC status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Code {
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unimplemented,
    Internal,
    Unavailable,
    Unauthenticated,
}

impl Code {
    /// Maps the HTTP status of a rejected API server request.
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 | 410 => Self::NotFound,
            409 => Self::AlreadyExists,
            429 => Self::ResourceExhausted,
            500..=599 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }
}

impl From<std::io::ErrorKind> for Code {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Self::InvalidArgument,
            ErrorKind::TimedOut => Self::DeadlineExceeded,
            ErrorKind::Interrupted => Self::Aborted,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrInUse
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe => Self::Unavailable,
            ErrorKind::UnexpectedEof | ErrorKind::WriteZero | ErrorKind::Other => Self::Internal,
            _ => Self::Unknown,
        }
    }
}
