/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::rc::Rc;
use std::time::Instant;

use tracing::Level;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::constants::STREAM_END;
use super::constants::TCP_SCHEME;
use super::constants::TLS_SCHEME;
use super::constants::stream_start;
use super::listener::EventListener;
use super::listener::ListenerContext;
use super::listener::Outbox;
use super::options::ConnectionOptions;
use super::transport::Transport;
use crate::EventManager;
use crate::Parameter;
use crate::XmlStream;
use crate::XmppError;

const EVENT_TARGET: &str = "connection";

/// Client side XMPP stream over a [Transport].
///
/// Every sent and received chunk goes through its own [XmlStream], so
/// listeners observe both directions as element events. `send` only
/// returns when no listener is blocking anymore, reading from the
/// transport as long as needed.
///
/// If nothing at all has been received within the timeout on a
/// `tcp://` address, the connection is retried once on the same
/// address with `tls://`.
pub struct Connection<T: Transport> {
    transport: T,
    options: ConnectionOptions,
    input: XmlStream,
    output: XmlStream,
    events: EventManager,
    listeners: Vec<Rc<dyn EventListener>>,
    outbox: Outbox,
    connected: bool,
    ready: bool,
    last_response: Option<Instant>,
    received_any_data: bool,
    last_blocking_listener: Option<&'static str>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, options: ConnectionOptions) -> Self {
        Connection {
            transport,
            options,
            input: XmlStream::new(),
            output: XmlStream::new(),
            events: EventManager::new(),
            listeners: Vec::new(),
            outbox: Outbox::default(),
            connected: false,
            ready: false,
            last_response: None,
            received_any_data: false,
            last_blocking_listener: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Connection level events: `send`, `receive` and `logger`.
    pub fn event_manager(&mut self) -> &mut EventManager {
        &mut self.events
    }

    pub fn input_stream(&mut self) -> &mut XmlStream {
        &mut self.input
    }

    pub fn output_stream(&mut self) -> &mut XmlStream {
        &mut self.output
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Marks the end of the stream negotiation. Set by the owner of the
    /// connection, never by the connection itself.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Registers a listener and lets it attach its event handlers.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: Rc<L>) {
        let mut ctx = ListenerContext {
            input: self.input.event_manager_mut(),
            output: self.output.event_manager_mut(),
            connection: &mut self.events,
            outbox: &self.outbox,
        };
        listener.clone().attach_events(&mut ctx);
        self.listeners.push(listener);
    }

    /// Discards the state of both stream parsers, as needed for a stream
    /// restart after TLS or SASL negotiation.
    pub fn reset_streams(&mut self) {
        self.input.reset();
        self.output.reset();
    }

    /// Emits a diagnostic message.
    ///
    /// The message goes to `tracing` and to the handlers of the `logger`
    /// event with the parameters `[Text(message), Level(level)]`.
    pub fn log(&self, message: &str, level: Level) -> Result<(), XmppError> {
        let address = self.transport.address();
        match level {
            Level::ERROR => error!(address, "{}", message),
            Level::WARN => warn!(address, "{}", message),
            Level::INFO => info!(address, "{}", message),
            Level::DEBUG => debug!(address, "{}", message),
            _ => trace!(address, "{}", message),
        }
        if !self.events.has_handlers("logger") {
            return Ok(());
        }
        self.events.trigger(
            "logger",
            EVENT_TARGET,
            vec![Parameter::Text(message.to_string()), Parameter::Level(level)],
        )
    }

    /// Opens the transport if needed and sends the stream header.
    pub fn connect(&mut self) -> Result<(), XmppError> {
        if !self.connected {
            self.log(
                &format!(
                    "connecting to {} timeout: ({})",
                    self.transport.address(),
                    self.options.timeout().as_secs()
                ),
                Level::DEBUG,
            )?;
            self.transport.connect(self.options.timeout())?;
            self.transport.set_blocking(true)?;
            self.connected = true;
            self.log(&format!("connected to {}", self.transport.address()), Level::DEBUG)?;
        }
        self.send(&stream_start(self.options.to()))
    }

    /// Sends the closing stream tag and closes the transport.
    pub fn disconnect(&mut self) -> Result<(), XmppError> {
        if self.connected {
            self.send(STREAM_END)?;
            self.transport.close()?;
            self.connected = false;
            self.log(
                &format!("disconnected from {}", self.transport.address()),
                Level::DEBUG,
            )?;
        }
        Ok(())
    }

    /// Sends raw XML.
    ///
    /// Connects first if necessary. The text is parsed by the output
    /// stream before it is written, so listeners see sent elements as
    /// events too. Does not return while any listener is blocking.
    pub fn send(&mut self, buffer: &str) -> Result<(), XmppError> {
        if !self.connected {
            self.connect()?;
        }

        self.log(&format!("sending data '{}'", buffer), Level::DEBUG)?;
        self.output.parse(buffer.as_bytes())?;
        if self.events.has_handlers("send") {
            self.events.trigger(
                "send",
                EVENT_TARGET,
                vec![Parameter::Text(buffer.to_string())],
            )?;
        }
        self.write_all(buffer.as_bytes())?;
        self.flush_outbox()?;

        while self.check_blocking_listeners() {
            self.receive()?;
        }
        Ok(())
    }

    /// Reads the next chunk from the transport.
    ///
    /// Received data is parsed by the input stream, which fires the
    /// element events. An empty result means nothing arrived.
    ///
    /// # Errors
    ///
    /// [XmppError::Timeout] if nothing arrived within the timeout, unless
    /// the one time TLS reconnect applies.
    pub fn receive(&mut self) -> Result<Vec<u8>, XmppError> {
        let buffer = self.transport.read(self.options.read_size())?;

        if !buffer.is_empty() {
            self.received_any_data = true;
            self.log(
                &format!("received buffer '{}'", String::from_utf8_lossy(&buffer)),
                Level::DEBUG,
            )?;
            self.input.parse(&buffer)?;
            if self.events.has_handlers("receive") {
                self.events.trigger(
                    "receive",
                    EVENT_TARGET,
                    vec![Parameter::Bytes(buffer.as_slice().into())],
                )?;
            }
            self.flush_outbox()?;
        }

        if let Err(err) = self.check_timeout(!buffer.is_empty()) {
            if !self.reconnect_tls()? {
                return Err(err);
            }
        }

        Ok(buffer)
    }

    /// True if any listener is blocking.
    pub fn check_blocking_listeners(&mut self) -> bool {
        let mut blocking = false;
        for listener in &self.listeners {
            if listener.is_blocking() {
                // only log when another listener starts blocking
                if self.last_blocking_listener != Some(listener.name()) {
                    debug!(listener = listener.name(), "listener is blocking");
                    self.last_blocking_listener = Some(listener.name());
                }
                blocking = true;
            }
        }
        blocking
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), XmppError> {
        let mut written = 0;
        while written < bytes.len() {
            let nr_written = self.transport.write(&bytes[written..])?;
            if nr_written == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            written += nr_written;
        }
        Ok(())
    }

    fn flush_outbox(&mut self) -> Result<(), XmppError> {
        while let Some(stanza) = self.outbox.pop() {
            self.send(&stanza)?;
        }
        Ok(())
    }

    fn check_timeout(&mut self, got_data: bool) -> Result<(), XmppError> {
        let now = Instant::now();
        if got_data {
            self.last_response = Some(now);
            return Ok(());
        }
        let last_response = *self.last_response.get_or_insert(now);
        let elapsed = now.duration_since(last_response);
        if elapsed >= self.options.timeout() {
            return Err(XmppError::Timeout(elapsed));
        }
        Ok(())
    }

    fn reconnect_tls(&mut self) -> Result<bool, XmppError> {
        if self.received_any_data {
            return Ok(false);
        }
        let Some(host) = self.transport.address().strip_prefix(TCP_SCHEME) else {
            return Ok(false);
        };
        let address = format!("{}{}", TLS_SCHEME, host);

        self.log(
            "connecting via TCP failed, now trying to connect via TLS",
            Level::WARN,
        )?;
        self.transport.close()?;
        self.transport.set_address(&address);
        self.connected = false;
        self.last_response = None;
        self.reset_streams();
        self.connect()?;
        Ok(true)
    }
}
