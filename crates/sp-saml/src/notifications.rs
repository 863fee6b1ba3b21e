//! Notification hooks.
//!
//! A closed set of typed subscription points. Subscribers receive an
//! immutable event and return nothing; they run synchronously, in
//! registration order, on the task executing the command.

use std::fmt;
use std::sync::Arc;

use crate::bindings::SamlMessageType;
use crate::commands::{CommandKind, CommandResult, Saml2Urls};
use crate::entity_id::EntityId;
use crate::types::SamlBinding;

/// SP metadata was generated.
#[derive(Debug, Clone, Copy)]
pub struct MetadataCreated<'a> {
    /// Entity id the metadata describes.
    pub entity_id: &'a EntityId,
    /// The metadata document as served.
    pub metadata: &'a str,
    /// Module URLs used in the document.
    pub urls: &'a Saml2Urls,
}

/// A protocol message is about to leave the SP.
#[derive(Debug, Clone, Copy)]
pub struct MessageSent<'a> {
    /// Message id.
    pub message_id: &'a str,
    /// Request or response.
    pub message_type: SamlMessageType,
    /// Binding it travels on.
    pub binding: SamlBinding,
    /// Destination endpoint.
    pub destination: &'a str,
    /// XML as sent.
    pub xml: &'a str,
}

/// A protocol message arrived and was decoded. Validation has not run yet.
#[derive(Debug, Clone, Copy)]
pub struct MessageReceived<'a> {
    /// Request or response.
    pub message_type: SamlMessageType,
    /// Binding it arrived on.
    pub binding: SamlBinding,
    /// Decoded XML.
    pub xml: &'a str,
    /// RelayState, if any.
    pub relay_state: Option<&'a str>,
}

/// A command produced its result.
#[derive(Debug, Clone, Copy)]
pub struct CommandResultCreated<'a> {
    /// The command that ran.
    pub command: CommandKind,
    /// Its result.
    pub result: &'a CommandResult,
}

type MetadataCreatedFn = Arc<dyn for<'a> Fn(&MetadataCreated<'a>) + Send + Sync>;
type MessageSentFn = Arc<dyn for<'a> Fn(&MessageSent<'a>) + Send + Sync>;
type MessageReceivedFn = Arc<dyn for<'a> Fn(&MessageReceived<'a>) + Send + Sync>;
type CommandResultCreatedFn = Arc<dyn for<'a> Fn(&CommandResultCreated<'a>) + Send + Sync>;

/// Registered subscribers, one list per hook.
#[derive(Clone, Default)]
pub struct Notifications {
    metadata_created: Vec<MetadataCreatedFn>,
    message_sent: Vec<MessageSentFn>,
    message_received: Vec<MessageReceivedFn>,
    command_result_created: Vec<CommandResultCreatedFn>,
}

impl Notifications {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to [`MetadataCreated`].
    pub fn on_metadata_created<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&MetadataCreated<'a>) + Send + Sync + 'static,
    {
        self.metadata_created.push(Arc::new(f));
        self
    }

    /// Subscribes to [`MessageSent`].
    pub fn on_message_sent<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&MessageSent<'a>) + Send + Sync + 'static,
    {
        self.message_sent.push(Arc::new(f));
        self
    }

    /// Subscribes to [`MessageReceived`].
    pub fn on_message_received<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&MessageReceived<'a>) + Send + Sync + 'static,
    {
        self.message_received.push(Arc::new(f));
        self
    }

    /// Subscribes to [`CommandResultCreated`].
    pub fn on_command_result_created<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&CommandResultCreated<'a>) + Send + Sync + 'static,
    {
        self.command_result_created.push(Arc::new(f));
        self
    }

    pub(crate) fn metadata_created(&self, event: &MetadataCreated<'_>) {
        for subscriber in &self.metadata_created {
            subscriber(event);
        }
    }

    pub(crate) fn message_sent(&self, event: &MessageSent<'_>) {
        for subscriber in &self.message_sent {
            subscriber(event);
        }
    }

    pub(crate) fn message_received(&self, event: &MessageReceived<'_>) {
        for subscriber in &self.message_received {
            subscriber(event);
        }
    }

    pub(crate) fn command_result_created(&self, event: &CommandResultCreated<'_>) {
        for subscriber in &self.command_result_created {
            subscriber(event);
        }
    }
}

impl fmt::Debug for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifications")
            .field("metadata_created", &self.metadata_created.len())
            .field("message_sent", &self.message_sent.len())
            .field("message_received", &self.message_received.len())
            .field("command_result_created", &self.command_result_created.len())
            .finish()
    }
}
