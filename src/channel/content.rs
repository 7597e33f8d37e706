//! Assembly of a single in-flight content message.
//!
//! Content arrives as an announcing method, one content-header frame
//! declaring the total body size, and zero or more body frames. The
//! assembly accumulates body bytes until the declared size is reached; a
//! declared size of zero completes at the header. Frames out of that order,
//! and bodies overrunning the declared size, are protocol violations.

use bytes::BytesMut;

use crate::{
    error::EngineError,
    message::Message,
    method::{
        basic,
        properties::{BasicProperties, ContentHeader},
    },
};

/// The method that announced the content being assembled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ContentOrigin {
    /// Pushed to a consumer.
    Deliver(basic::Deliver),
    /// Returned to the publisher.
    Return(basic::Return),
    /// Answer to a synchronous get.
    Fetch(basic::GetOk),
}

/// A finished assembly: the origin plus the complete message.
#[derive(Debug)]
pub(crate) struct AssembledContent {
    pub(crate) origin: ContentOrigin,
    pub(crate) message: Message,
}

/// Outcome of feeding one frame into an assembly.
#[derive(Debug)]
pub(crate) enum ContentStep {
    /// More body frames are expected.
    Continue(ContentAssembly),
    /// The declared body size was reached.
    Complete(AssembledContent),
}

/// One in-flight message assembly.
///
/// The stepping methods consume the assembly and either hand it back inside
/// [`ContentStep::Continue`] or dissolve it into the finished message, so a
/// completed assembly cannot be fed again by construction.
#[derive(Debug)]
pub(crate) struct ContentAssembly {
    origin: ContentOrigin,
    declared: Option<(u64, BasicProperties)>,
    body: BytesMut,
}

impl ContentAssembly {
    /// Start an assembly for the announced content.
    pub(crate) fn new(origin: ContentOrigin) -> Self {
        Self {
            origin,
            declared: None,
            body: BytesMut::new(),
        }
    }

    /// Accept the content header; completes immediately for an empty body.
    ///
    /// # Errors
    /// Returns a protocol violation when a header was already accepted.
    pub(crate) fn accept_header(mut self, header: ContentHeader) -> Result<ContentStep, EngineError> {
        if self.declared.is_some() {
            return Err(EngineError::violation(
                "second content header for one message",
            ));
        }
        if header.body_size == 0 {
            return Ok(ContentStep::Complete(self.finish(header.properties)));
        }
        self.declared = Some((header.body_size, header.properties));
        Ok(ContentStep::Continue(self))
    }

    /// Accept one body frame; completes when the declared size is reached.
    ///
    /// # Errors
    /// Returns a protocol violation when no header was seen yet or the
    /// accumulated body exceeds the declared size.
    pub(crate) fn accept_body(mut self, chunk: &[u8]) -> Result<ContentStep, EngineError> {
        let Some(&(declared, _)) = self.declared.as_ref() else {
            return Err(EngineError::violation(
                "content body before the content header",
            ));
        };
        let assembled = self.body.len() as u64 + chunk.len() as u64;
        if assembled > declared {
            return Err(EngineError::violation(format!(
                "content body of {assembled} bytes overruns the declared size of {declared}"
            )));
        }
        self.body.extend_from_slice(chunk);
        if assembled == declared {
            let properties = self
                .declared
                .take()
                .map_or_else(BasicProperties::default, |(_, p)| p);
            return Ok(ContentStep::Complete(self.finish(properties)));
        }
        Ok(ContentStep::Continue(self))
    }

    fn finish(self, properties: BasicProperties) -> AssembledContent {
        AssembledContent {
            origin: self.origin,
            message: Message {
                properties,
                body: self.body.freeze(),
            },
        }
    }
}
