// Copyright 2025 the wireflow authors
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

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect did not complete within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("session is not connected")]
    NotConnected,

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("frame of length {length} exceeds limit {limit}")]
    FrameTooLarge { length: usize, limit: usize },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("config file error: {0}")]
    Config(#[from] config::ConfigError),
}
