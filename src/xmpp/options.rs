/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_READ_SIZE: usize = 4096;

/// Settings of a [Connection](crate::Connection).
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    to: String,
    timeout: Duration,
    read_size: usize,
}

impl ConnectionOptions {
    /// Options for a stream addressed to the `to` domain.
    pub fn new(to: &str) -> Self {
        ConnectionOptions {
            to: to.to_string(),
            timeout: DEFAULT_TIMEOUT,
            read_size: DEFAULT_READ_SIZE,
        }
    }

    /// Connect timeout of the transport, also the liveness window of
    /// the stream.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upper limit of a single transport read.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_size = size.max(1);
        self
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }
}
