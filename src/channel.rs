//! Per-channel state: lifecycle, pending synchronous calls, consumers, and
//! content assembly.
//!
//! A channel never touches connection internals. Handling a frame produces a
//! list of [`ChannelEvent`]s; the connection applies them — transmitting
//! acknowledgement frames, retiring QoS negotiations, invoking handler
//! callbacks. That narrow seam replaces the privileged cross-component
//! access the protocol's reference implementations tend to grow.
//!
//! Synchronous replies are matched strictly in FIFO order against the
//! pending-call queue: the protocol guarantees a server answers one
//! channel's methods in the order they were sent, so the oldest pending
//! expectation always owns the next reply. A reply whose shape does not fit
//! that expectation is a protocol violation, not a candidate for reordering.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, warn};

use crate::{
    error::EngineError,
    message::{Delivery, FetchedMessage, ReturnedMessage},
    method::{
        basic::{self, BasicMethod},
        channel::ChannelMethod,
        exchange::ExchangeMethod,
        properties::ContentHeader,
        queue::QueueMethod,
    },
    qos::{QosScope, QosTracker},
};

mod content;

#[cfg(test)]
mod tests;

use content::{AssembledContent, ContentAssembly, ContentOrigin, ContentStep};

/// Identifier of a channel within its connection; 0 is reserved for the
/// connection itself.
pub type ChannelId = u16;

/// Lifecycle of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLifecycle {
    /// Not open; initial and terminal.
    Closed,
    /// Open request sent, awaiting confirmation.
    Opening,
    /// Accepting traffic.
    Open,
    /// Close requested, awaiting confirmation.
    Closing,
}

/// A synchronous reply the channel is waiting for, in send order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Expect {
    OpenOk,
    CloseOk,
    FlowOk,
    QosOk { scope: QosScope },
    ExchangeDeclareOk,
    ExchangeDeleteOk,
    QueueDeclareOk,
    QueueBindOk,
    QueueUnbindOk,
    QueuePurgeOk,
    QueueDeleteOk,
    ConsumeOk,
    CancelOk,
    Get,
    RecoverOk,
}

/// Effects of handling one frame on a channel.
///
/// The connection translates these into frames to transmit and handler
/// callbacks; the channel itself never calls outward.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ChannelEvent {
    /// The open handshake finished.
    Opened,
    /// The peer closed the channel; a CloseOk must be transmitted.
    ClosedByPeer {
        /// Present when the peer reported an error rather than a clean close.
        error: Option<EngineError>,
    },
    /// Our close request was confirmed; the channel can be dropped.
    CloseConfirmed,
    /// The peer asked to pause or resume flow; a FlowOk must be transmitted.
    FlowRequested { active: bool },
    /// The peer confirmed our flow request.
    FlowConfirmed { active: bool },
    /// A QoS negotiation was acknowledged for the given scope.
    QosConfirmed { scope: QosScope },
    /// Queue declaration confirmed.
    QueueDeclared {
        queue: String,
        messages: u32,
        consumers: u32,
    },
    /// Queue binding confirmed.
    QueueBound,
    /// Queue unbinding confirmed.
    QueueUnbound,
    /// Queue purge confirmed.
    QueuePurged { messages: u32 },
    /// Queue deletion confirmed.
    QueueDeleted { messages: u32 },
    /// Exchange declaration confirmed.
    ExchangeDeclared,
    /// Exchange deletion confirmed.
    ExchangeDeleted,
    /// Consumer confirmed by the server.
    ConsumerStarted { consumer_tag: String },
    /// Consumer cancellation confirmed.
    ConsumerCancelled { consumer_tag: String },
    /// Recovery confirmed.
    RecoverConfirmed,
    /// A pending call was failed by a closing scope.
    CallFailed { error: EngineError },
    /// A complete message arrived for a consumer.
    Delivered(Delivery),
    /// A complete returned message arrived.
    Returned(ReturnedMessage),
    /// A complete fetched message arrived.
    Fetched(FetchedMessage),
    /// A synchronous get found the queue empty.
    FetchEmpty,
}

/// State of one logical channel.
#[derive(Debug)]
pub(crate) struct ChannelState {
    id: ChannelId,
    lifecycle: ChannelLifecycle,
    pending: VecDeque<Expect>,
    consumers: BTreeSet<String>,
    qos: QosTracker,
    assembly: Option<ContentAssembly>,
    /// Peer-controlled flow flag; informational only.
    flow_active: bool,
}

impl ChannelState {
    /// Create a channel in the `Opening` state with its OpenOk pending.
    pub(crate) fn opening(id: ChannelId) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(Expect::OpenOk);
        Self {
            id,
            lifecycle: ChannelLifecycle::Opening,
            pending,
            consumers: BTreeSet::new(),
            qos: QosTracker::default(),
            assembly: None,
            flow_active: true,
        }
    }

    pub(crate) const fn id(&self) -> ChannelId { self.id }

    pub(crate) const fn lifecycle(&self) -> ChannelLifecycle { self.lifecycle }

    pub(crate) const fn is_open(&self) -> bool {
        matches!(self.lifecycle, ChannelLifecycle::Open)
    }

    pub(crate) const fn qos(&self) -> &QosTracker { &self.qos }

    pub(crate) fn qos_mut(&mut self) -> &mut QosTracker { &mut self.qos }

    /// Tags of the currently confirmed consumers.
    pub(crate) fn consumer_tags(&self) -> impl Iterator<Item = &str> {
        self.consumers.iter().map(String::as_str)
    }

    /// Register a synchronous call awaiting its reply.
    pub(crate) fn push_expect(&mut self, expect: Expect) { self.pending.push_back(expect); }

    /// Number of replies still outstanding.
    pub(crate) fn pending_calls(&self) -> usize { self.pending.len() }

    /// Move to `Closing` and fail every outstanding call.
    ///
    /// Used for a locally initiated close; the CloseOk expectation is pushed
    /// afterwards by the caller that transmits the Close method.
    pub(crate) fn begin_close(&mut self, out: &mut Vec<ChannelEvent>) {
        self.fail_pending(&EngineError::ChannelClosing, out);
        self.lifecycle = ChannelLifecycle::Closing;
        self.assembly = None;
    }

    /// Force the channel closed without any further wire exchange.
    ///
    /// Used when the connection itself is going away; `error` is what the
    /// outstanding calls are failed with.
    pub(crate) fn force_close(&mut self, error: &EngineError, out: &mut Vec<ChannelEvent>) {
        self.fail_pending(error, out);
        self.lifecycle = ChannelLifecycle::Closed;
        self.assembly = None;
        self.consumers.clear();
    }

    fn fail_pending(&mut self, error: &EngineError, out: &mut Vec<ChannelEvent>) {
        for _ in self.pending.drain(..) {
            out.push(ChannelEvent::CallFailed {
                error: error.clone(),
            });
        }
        self.qos.abandon();
    }

    /// Pop the oldest pending call, which must match the arrived reply.
    fn resolve(&mut self, reply: &Expect) -> Result<Expect, EngineError> {
        match self.pending.pop_front() {
            Some(front) if front == *reply => Ok(front),
            Some(front) => Err(EngineError::violation(format!(
                "reply {reply:?} on channel {} does not match oldest pending call {front:?}",
                self.id
            ))),
            None => Err(EngineError::violation(format!(
                "unsolicited reply {reply:?} on channel {}",
                self.id
            ))),
        }
    }

    /// Handle a channel-class method addressed to this channel.
    pub(crate) fn handle_channel_method(
        &mut self,
        method: ChannelMethod,
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        match method {
            ChannelMethod::OpenOk { .. } => {
                self.resolve(&Expect::OpenOk)?;
                if self.lifecycle != ChannelLifecycle::Opening {
                    return Err(EngineError::violation(format!(
                        "open-ok on channel {} in state {:?}",
                        self.id, self.lifecycle
                    )));
                }
                self.lifecycle = ChannelLifecycle::Open;
                debug!(channel = self.id, "channel open");
                out.push(ChannelEvent::Opened);
            }
            ChannelMethod::Close(close) => {
                let error = (close.reply_code != 200).then(|| EngineError::Channel {
                    code: close.reply_code,
                    text: close.reply_text,
                });
                self.fail_pending(&EngineError::ChannelClosing, out);
                self.lifecycle = ChannelLifecycle::Closed;
                self.assembly = None;
                out.push(ChannelEvent::ClosedByPeer { error });
            }
            ChannelMethod::CloseOk => {
                // Late replies for a closing channel are accepted silently.
                if self.lifecycle == ChannelLifecycle::Closing {
                    self.pending.retain(|e| *e != Expect::CloseOk);
                    self.lifecycle = ChannelLifecycle::Closed;
                    out.push(ChannelEvent::CloseConfirmed);
                }
            }
            ChannelMethod::Flow { active } => {
                self.flow_active = active;
                out.push(ChannelEvent::FlowRequested { active });
            }
            ChannelMethod::FlowOk { active } => {
                self.resolve(&Expect::FlowOk)?;
                self.flow_active = active;
                out.push(ChannelEvent::FlowConfirmed { active });
            }
            ChannelMethod::Open { .. } => {
                return Err(EngineError::violation(format!(
                    "server sent channel.open on channel {}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Handle an exchange-class method addressed to this channel.
    pub(crate) fn handle_exchange_method(
        &mut self,
        method: ExchangeMethod,
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        match method {
            ExchangeMethod::DeclareOk => {
                self.resolve(&Expect::ExchangeDeclareOk)?;
                out.push(ChannelEvent::ExchangeDeclared);
            }
            ExchangeMethod::DeleteOk => {
                self.resolve(&Expect::ExchangeDeleteOk)?;
                out.push(ChannelEvent::ExchangeDeleted);
            }
            ExchangeMethod::Declare(_) | ExchangeMethod::Delete(_) => {
                return Err(EngineError::violation(format!(
                    "server sent an exchange request on channel {}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Handle a queue-class method addressed to this channel.
    pub(crate) fn handle_queue_method(
        &mut self,
        method: QueueMethod,
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        match method {
            QueueMethod::DeclareOk(ok) => {
                self.resolve(&Expect::QueueDeclareOk)?;
                out.push(ChannelEvent::QueueDeclared {
                    queue: ok.queue,
                    messages: ok.message_count,
                    consumers: ok.consumer_count,
                });
            }
            QueueMethod::BindOk => {
                self.resolve(&Expect::QueueBindOk)?;
                out.push(ChannelEvent::QueueBound);
            }
            QueueMethod::UnbindOk => {
                self.resolve(&Expect::QueueUnbindOk)?;
                out.push(ChannelEvent::QueueUnbound);
            }
            QueueMethod::PurgeOk { message_count } => {
                self.resolve(&Expect::QueuePurgeOk)?;
                out.push(ChannelEvent::QueuePurged {
                    messages: message_count,
                });
            }
            QueueMethod::DeleteOk { message_count } => {
                self.resolve(&Expect::QueueDeleteOk)?;
                out.push(ChannelEvent::QueueDeleted {
                    messages: message_count,
                });
            }
            QueueMethod::Declare(_)
            | QueueMethod::Bind(_)
            | QueueMethod::Unbind(_)
            | QueueMethod::Purge(_)
            | QueueMethod::Delete(_) => {
                return Err(EngineError::violation(format!(
                    "server sent a queue request on channel {}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Handle a basic-class method addressed to this channel.
    pub(crate) fn handle_basic_method(
        &mut self,
        method: BasicMethod,
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        match method {
            BasicMethod::QosOk => {
                let Expect::QosOk { scope } = self.resolve(&any_qos_ok(&self.pending))? else {
                    unreachable!("resolve only returns the probed expectation");
                };
                if scope == QosScope::Channel {
                    self.qos.acknowledge();
                }
                out.push(ChannelEvent::QosConfirmed { scope });
            }
            BasicMethod::ConsumeOk { consumer_tag } => {
                self.resolve(&Expect::ConsumeOk)?;
                self.consumers.insert(consumer_tag.clone());
                out.push(ChannelEvent::ConsumerStarted { consumer_tag });
            }
            BasicMethod::CancelOk { consumer_tag } => {
                self.resolve(&Expect::CancelOk)?;
                self.consumers.remove(&consumer_tag);
                out.push(ChannelEvent::ConsumerCancelled { consumer_tag });
            }
            BasicMethod::RecoverOk => {
                self.resolve(&Expect::RecoverOk)?;
                out.push(ChannelEvent::RecoverConfirmed);
            }
            BasicMethod::Deliver(deliver) => {
                if !self.consumers.contains(&deliver.consumer_tag) {
                    warn!(
                        channel = self.id,
                        consumer_tag = %deliver.consumer_tag,
                        "delivery for an unknown consumer tag"
                    );
                }
                self.begin_content(ContentOrigin::Deliver(deliver))?;
            }
            BasicMethod::Return(returned) => {
                self.begin_content(ContentOrigin::Return(returned))?;
            }
            BasicMethod::GetOk(get_ok) => {
                self.resolve(&Expect::Get)?;
                self.begin_content(ContentOrigin::Fetch(get_ok))?;
            }
            BasicMethod::GetEmpty { .. } => {
                self.resolve(&Expect::Get)?;
                out.push(ChannelEvent::FetchEmpty);
            }
            BasicMethod::Qos(_)
            | BasicMethod::Consume(_)
            | BasicMethod::Cancel { .. }
            | BasicMethod::Publish(_)
            | BasicMethod::Get { .. }
            | BasicMethod::Ack { .. }
            | BasicMethod::Reject { .. }
            | BasicMethod::Recover { .. }
            | BasicMethod::Nack { .. } => {
                return Err(EngineError::violation(format!(
                    "server sent a client-only basic method on channel {}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    fn begin_content(&mut self, origin: ContentOrigin) -> Result<(), EngineError> {
        if self.assembly.is_some() {
            return Err(EngineError::violation(format!(
                "content announcement on channel {} while a message is still assembling",
                self.id
            )));
        }
        self.assembly = Some(ContentAssembly::new(origin));
        Ok(())
    }

    /// Handle a content-header frame addressed to this channel.
    pub(crate) fn handle_header(
        &mut self,
        header: ContentHeader,
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        let Some(assembly) = self.assembly.take() else {
            return Err(EngineError::violation(format!(
                "content header on channel {} with no announcing method",
                self.id
            )));
        };
        match assembly.accept_header(header)? {
            ContentStep::Continue(assembly) => self.assembly = Some(assembly),
            ContentStep::Complete(done) => out.push(complete_event(done)),
        }
        Ok(())
    }

    /// Handle a content-body frame addressed to this channel.
    pub(crate) fn handle_body(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<ChannelEvent>,
    ) -> Result<(), EngineError> {
        let Some(assembly) = self.assembly.take() else {
            return Err(EngineError::violation(format!(
                "content body on channel {} with no preceding header",
                self.id
            )));
        };
        match assembly.accept_body(chunk)? {
            ContentStep::Continue(assembly) => self.assembly = Some(assembly),
            ContentStep::Complete(done) => out.push(complete_event(done)),
        }
        Ok(())
    }
}

/// The front of the queue when a QosOk arrives, preserving its scope.
fn any_qos_ok(pending: &VecDeque<Expect>) -> Expect {
    match pending.front() {
        Some(Expect::QosOk { scope }) => Expect::QosOk { scope: *scope },
        // Wrong or missing: hand resolve() a channel-scope probe so its
        // mismatch path produces the violation.
        _ => Expect::QosOk {
            scope: QosScope::Channel,
        },
    }
}

fn complete_event(done: AssembledContent) -> ChannelEvent {
    let AssembledContent { origin, message } = done;
    match origin {
        ContentOrigin::Deliver(d) => ChannelEvent::Delivered(Delivery {
            consumer_tag: d.consumer_tag,
            delivery_tag: d.delivery_tag,
            redelivered: d.redelivered,
            exchange: d.exchange,
            routing_key: d.routing_key,
            message,
        }),
        ContentOrigin::Return(r) => ChannelEvent::Returned(ReturnedMessage {
            reply_code: r.reply_code,
            reply_text: r.reply_text,
            exchange: r.exchange,
            routing_key: r.routing_key,
            message,
        }),
        ContentOrigin::Fetch(g) => ChannelEvent::Fetched(FetchedMessage {
            delivery_tag: g.delivery_tag,
            redelivered: g.redelivered,
            exchange: g.exchange,
            routing_key: g.routing_key,
            message_count: g.message_count,
            message,
        }),
    }
}
