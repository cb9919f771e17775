//! Live array synchronization engine
//!
//! A [`LiveArray`] replicates a server-held ordered collection from a stream
//! of sequence-numbered deltas. The engine is network free: every call returns
//! an [`ApplyOutcome`] describing what changed and which commands (if any)
//! must be broadcast back to the server. Delivering changes to a
//! [`LiveArrayListener`] and sending commands is left to the caller, so the
//! engine can sit behind any lock without running user code under it.
//!
//! ## Sequencing
//!
//! With `last` being the last applied serial:
//!
//! - a negative serial is a sentinel and is applied without ordering checks
//! - when `last > 0` and `serial != last + 1` the delta is rejected as a gap,
//!   the error counter grows and a bootstrap is requested while fewer than
//!   [`MAX_RESYNC_ATTEMPTS`] gaps have been seen
//! - otherwise the delta is applied and `last = serial`
//!
//! `clear` is the server's resync reset: it is never sequence checked and
//! sets `last` back to zero so the following bootstrap is accepted.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use verto_live_array::{Delta, LiveArray, LiveArrayCommand};
//!
//! let mut roster = LiveArray::new("conference-liveArray.3000", "3000", json!(null));
//!
//! roster.apply(1, Delta::Add { key: Some("a".into()), index: None, data: json!("Alice") }).unwrap();
//! roster.apply(2, Delta::Add { key: Some("b".into()), index: None, data: json!("Bob") }).unwrap();
//!
//! // Serial 3 went missing: the delta is rejected and a bootstrap requested
//! let outcome = roster
//!     .apply(4, Delta::Del { key: Some("a".into()), index: None })
//!     .unwrap();
//! assert!(!outcome.applied);
//! assert!(matches!(outcome.commands[..], [LiveArrayCommand::Bootstrap(_)]));
//! assert_eq!(roster.len(), 2);
//! ```

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{LiveArrayError, LiveArrayResult};
use crate::ordered_map::OrderedMap;
use crate::packet::{Delta, LiveArrayAction, LiveArrayCommand, LiveArrayPacket};

/// Gaps tolerated before automatic resynchronization stops
pub const MAX_RESYNC_ATTEMPTS: u32 = 3;

/// Change notification produced by a successful apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveArrayChange {
    /// Serial of the delta; `None` for `clear`
    pub serial: Option<i64>,
    pub action: LiveArrayAction,
    pub key: Option<String>,
    pub index: Option<usize>,
    pub data: Option<Value>,
    /// The consumer should re-render the whole collection
    pub redraw: bool,
}

impl LiveArrayChange {
    fn new(serial: Option<i64>, action: LiveArrayAction) -> Self {
        Self {
            serial,
            action,
            key: None,
            index: None,
            data: None,
            redraw: false,
        }
    }
}

/// A rejected out-of-order delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceGap {
    pub last_serial: i64,
    pub serial: i64,
    /// Error count after this gap was recorded
    pub error_count: u32,
}

/// Consumer of live-array changes
pub trait LiveArrayListener: Send + Sync {
    fn on_change(&self, change: &LiveArrayChange);

    fn on_error(&self, gap: &SequenceGap) {
        let _ = gap;
    }
}

/// Result of feeding one delta to the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Whether the delta passed sequencing and was applied
    pub applied: bool,
    /// Notification for the listener, if the delta changed anything visible
    pub change: Option<LiveArrayChange>,
    /// Set when the delta was rejected as out of order
    pub gap: Option<SequenceGap>,
    /// Commands to broadcast on the bound channel
    pub commands: Vec<LiveArrayCommand>,
}

impl ApplyOutcome {
    fn applied(change: Option<LiveArrayChange>) -> Self {
        Self {
            applied: true,
            change,
            ..Default::default()
        }
    }

    /// Hand the change or gap to `listener`
    pub fn deliver(&self, listener: &dyn LiveArrayListener) {
        if let Some(gap) = &self.gap {
            listener.on_error(gap);
        }
        if let Some(change) = &self.change {
            listener.on_change(change);
        }
    }
}

/// Replicated ordered collection bound to a channel and a name
#[derive(Debug, Clone)]
pub struct LiveArray {
    context: String,
    name: String,
    user_obj: Value,
    items: OrderedMap<String, Value>,
    last_serial: i64,
    error_count: u32,
    destroyed: bool,
}

impl LiveArray {
    /// Create an empty live array.
    ///
    /// `user_obj` is sent back to the server with every bootstrap request.
    pub fn new(context: impl Into<String>, name: impl Into<String>, user_obj: Value) -> Self {
        Self {
            context: context.into(),
            name: name.into(),
            user_obj,
            items: OrderedMap::new(),
            last_serial: 0,
            error_count: 0,
            destroyed: false,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_obj(&self) -> &Value {
        &self.user_obj
    }

    pub fn last_serial(&self) -> i64 {
        self.last_serial
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Too many gaps were seen; no more automatic bootstraps are issued
    pub fn is_degraded(&self) -> bool {
        self.error_count >= MAX_RESYNC_ATTEMPTS
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn items(&self) -> &OrderedMap<String, Value> {
        &self.items
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.get(&key.to_string())
    }

    pub fn values(&self) -> Vec<&Value> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Full resync request carrying the user context object
    pub fn bootstrap(&self) -> LiveArrayCommand {
        LiveArrayCommand::Bootstrap(self.user_obj.clone())
    }

    pub fn heartbeat(&self) -> LiveArrayCommand {
        LiveArrayCommand::Heartbeat(self.user_obj.clone())
    }

    /// Drop local contents and ask the server for another page.
    ///
    /// The outcome carries a `clear` change for the listener and the
    /// `changepage` command to broadcast.
    pub fn change_page(&mut self, obj: Value) -> ApplyOutcome {
        self.reset_contents();
        ApplyOutcome {
            commands: vec![LiveArrayCommand::ChangePage(obj)],
            ..ApplyOutcome::applied(Some(LiveArrayChange::new(None, LiveArrayAction::Clear)))
        }
    }

    /// Leave the degraded state and request a fresh bootstrap
    pub fn reset_errors(&mut self) -> LiveArrayCommand {
        debug!(name = %self.name, errors = self.error_count, "Resetting live array error count");
        self.error_count = 0;
        self.bootstrap()
    }

    /// Tear the engine down; later applies fail
    pub fn destroy(&mut self) {
        self.reset_contents();
        self.destroyed = true;
    }

    /// Decode and apply a wire packet.
    ///
    /// Packets addressed to another array are ignored and yield an empty
    /// outcome.
    pub fn apply_packet(&mut self, packet: LiveArrayPacket) -> LiveArrayResult<ApplyOutcome> {
        self.ensure_alive()?;

        if packet.name.as_deref() != Some(self.name.as_str()) {
            debug!(
                name = %self.name,
                packet_name = ?packet.name,
                "Ignoring live array packet for another array"
            );
            return Ok(ApplyOutcome::default());
        }

        let (serial, delta) = packet.into_delta()?;

        match (serial, &delta) {
            (_, Delta::Clear) => self.apply(serial.unwrap_or_default(), delta),
            (Some(serial), _) => self.apply(serial, delta),
            (None, _) => Err(LiveArrayError::MalformedPacket(format!(
                "{} packet without wireSerno",
                delta.action()
            ))),
        }
    }

    /// Apply one delta at `serial`
    pub fn apply(&mut self, serial: i64, delta: Delta) -> LiveArrayResult<ApplyOutcome> {
        self.ensure_alive()?;

        if let Delta::Clear = delta {
            self.reset_contents();
            return Ok(ApplyOutcome::applied(Some(LiveArrayChange::new(
                None,
                LiveArrayAction::Clear,
            ))));
        }

        if let Err(gap) = self.check_serial(serial) {
            let commands = if gap.error_count < MAX_RESYNC_ATTEMPTS {
                vec![self.bootstrap()]
            } else {
                warn!(
                    name = %self.name,
                    errors = gap.error_count,
                    "Live array degraded, not requesting another bootstrap"
                );
                Vec::new()
            };
            return Ok(ApplyOutcome {
                applied: false,
                change: None,
                gap: Some(gap),
                commands,
            });
        }

        let default_key = || serial.to_string();
        let mut change = LiveArrayChange::new(Some(serial), delta.action());

        match delta {
            Delta::Init { key, index, data } => {
                change.key = Some(key.unwrap_or_else(default_key));
                change.index = index;
                change.data = Some(data);
            }
            Delta::BootObj(pairs) => {
                self.items.clear();
                let data: Vec<Value> = pairs
                    .iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect();
                for (key, value) in pairs {
                    self.items.add(key, value, None);
                }
                change.data = Some(Value::Array(data));
                change.redraw = true;
            }
            Delta::Add { key, index, data } | Delta::Modify { key, index, data } => {
                let key = key.unwrap_or_else(default_key);
                change.redraw = self.items.add(key.clone(), data.clone(), index);
                change.index = index.or_else(|| self.items.index_of(&key));
                change.key = Some(key);
                change.data = Some(data);
            }
            Delta::Del { key, index } => {
                let key = key.unwrap_or_else(default_key);
                let index = index.or_else(|| self.items.index_of(&key));
                if !self.items.remove(&key) {
                    debug!(name = %self.name, key = %key, "Delete for unknown key");
                    return Ok(ApplyOutcome::applied(None));
                }
                change.key = Some(key);
                change.index = index;
            }
            Delta::Reorder(order) => {
                self.items.reorder(order);
            }
            Delta::Other { data, .. } => {
                change.data = data;
            }
            Delta::Clear => {
                self.reset_contents();
                change.serial = None;
            }
        }

        Ok(ApplyOutcome::applied(Some(change)))
    }

    /// Validate `serial` against the last applied one, advancing on success
    pub fn check_serial(&mut self, serial: i64) -> Result<(), SequenceGap> {
        if serial < 0 {
            return Ok(());
        }

        if self.last_serial > 0 && self.last_serial.checked_add(1) != Some(serial) {
            self.error_count = self.error_count.saturating_add(1);
            let gap = SequenceGap {
                last_serial: self.last_serial,
                serial,
                error_count: self.error_count,
            };
            warn!(
                name = %self.name,
                last = gap.last_serial,
                serial = gap.serial,
                errors = gap.error_count,
                "Live array sequence gap"
            );
            return Err(gap);
        }

        self.last_serial = serial;
        Ok(())
    }

    fn reset_contents(&mut self) {
        self.items.clear();
        self.last_serial = 0;
    }

    fn ensure_alive(&self) -> LiveArrayResult<()> {
        if self.destroyed {
            return Err(LiveArrayError::Destroyed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}
