//! The per-session handle handed to request handlers.
//!
//! A [`Session`] is a cheap, cloneable reference to state shared by every
//! request carrying the same token. All operations lock that state for their
//! own duration only, so concurrent requests on one token interleave per
//! operation while unrelated sessions never contend.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use crate::database::Snapshot;
use crate::error::{Error, Result};

/// A session's regular and flash values, keyed by string.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
    is_new: bool,
}

struct Inner {
    id: String,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    values: Map<String, Value>,
    flashes: Map<String, Value>,
    expiry_date: Option<OffsetDateTime>,
    destroyed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("is_new", &self.is_new)
            .field("values", &state.values.len())
            .field("flashes", &state.flashes.len())
            .field("expiry_date", &state.expiry_date)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(id: String, expiry_date: OffsetDateTime) -> Self {
        Self::build(id, Snapshot::default(), expiry_date)
    }

    pub(crate) fn from_snapshot(id: String, snapshot: Snapshot) -> Self {
        let expiry_date = snapshot.expiry_date;
        Self::build(id, snapshot, expiry_date)
    }

    fn build(id: String, snapshot: Snapshot, expiry_date: OffsetDateTime) -> Self {
        Self {
            is_new: false,
            inner: Arc::new(Inner {
                id,
                state: Mutex::new(State {
                    values: snapshot.values,
                    flashes: snapshot.flashes,
                    expiry_date: Some(expiry_date),
                    destroyed: false,
                }),
            }),
        }
    }

    /// The session token, as carried by the cookie.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether this session was created by the `start` that returned this
    /// handle.
    ///
    /// The flag belongs to the handle, not the session: handles obtained by
    /// later lookups of the same token report `false`.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn into_new(mut self) -> Self {
        self.is_new = true;
        self
    }

    /// Whether two handles refer to the same underlying session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Encode)?;
        self.write(|state| {
            state.values.insert(key.into(), value);
        })
    }

    /// Gets the value stored under `key`, decoded as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::Decode)
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.read(|state| state.values.get(key).cloned())
    }

    /// Gets the value under `key` rendered as a string.
    ///
    /// Numbers and booleans are formatted; other JSON types yield `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_value(key).and_then(value_to_string)
    }

    /// Gets the value under `key` as an integer, parsing strings if needed.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get_value(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Gets the value under `key` as a float, parsing strings if needed.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get_value(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Gets the value under `key` as a boolean, parsing strings if needed.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get_value(key)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Every regular value of the session.
    pub fn get_all(&self) -> Map<String, Value> {
        self.read(|state| state.values.clone())
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.read_mut(|state| state.values.remove(key).is_some())
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all regular values. Flash values and the token are kept.
    pub fn clear(&self) {
        self.read_mut(|state| state.values.clear());
    }

    /// Adds `n` to the integer under `key` (missing counts as zero) and
    /// returns the new value.
    pub fn increment(&self, key: &str, n: i64) -> Result<i64> {
        let mut result = 0;
        self.write(|state| {
            let current = match state.values.get(key) {
                Some(Value::Number(v)) => v.as_i64().unwrap_or_default(),
                Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
                _ => 0,
            };
            result = current.saturating_add(n);
            state.values.insert(key.to_string(), Value::from(result));
        })?;
        Ok(result)
    }

    pub fn decrement(&self, key: &str, n: i64) -> Result<i64> {
        self.increment(key, n.saturating_neg())
    }

    /// Stores a flash value, removed by the first read.
    pub fn set_flash(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Encode)?;
        self.write(|state| {
            state.flashes.insert(key.into(), value);
        })
    }

    /// Takes the flash value under `key`, decoded as `T`.
    ///
    /// The value is consumed even if decoding fails.
    pub fn get_flash<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_flash_value(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::Decode)
    }

    pub fn get_flash_value(&self, key: &str) -> Option<Value> {
        self.read_mut(|state| state.flashes.remove(key))
    }

    /// Takes the flash value under `key` rendered as a string.
    pub fn get_flash_string(&self, key: &str) -> Option<String> {
        self.get_flash_value(key).and_then(value_to_string)
    }

    /// Takes every flash value at once.
    pub fn get_flashes(&self) -> Map<String, Value> {
        self.read_mut(|state| std::mem::take(&mut state.flashes))
    }

    /// Reads a flash value without consuming it.
    pub fn peek_flash(&self, key: &str) -> Option<Value> {
        self.read(|state| state.flashes.get(key).cloned())
    }

    pub fn has_flash(&self, key: &str) -> bool {
        self.read(|state| state.flashes.contains_key(key))
    }

    pub fn has_flashes(&self) -> bool {
        self.read(|state| !state.flashes.is_empty())
    }

    pub fn delete_flash(&self, key: &str) -> bool {
        self.read_mut(|state| state.flashes.remove(key).is_some())
    }

    /// Removes every flash value. Regular values are kept.
    pub fn clear_flashes(&self) {
        self.read_mut(|state| state.flashes.clear());
    }

    /// When the session stops resolving, `None` once destroyed.
    pub fn expiry_date(&self) -> Option<OffsetDateTime> {
        self.inner.state.lock().expiry_date
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub(crate) fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        let state = self.inner.state.lock();
        state.destroyed || state.expiry_date.is_some_and(|at| at <= now)
    }

    /// Whether the session holds anything worth a cookie.
    pub(crate) fn has_data(&self) -> bool {
        let state = self.inner.state.lock();
        !state.destroyed && (!state.values.is_empty() || !state.flashes.is_empty())
    }

    pub(crate) fn shift_expiry(&self, lifetime: Duration) {
        let mut state = self.inner.state.lock();
        if !state.destroyed {
            state.expiry_date = Some(OffsetDateTime::now_utc() + lifetime);
        }
    }

    /// Drops all state and marks the handle dead.
    pub(crate) fn mark_destroyed(&self) {
        let mut state = self.inner.state.lock();
        state.values.clear();
        state.flashes.clear();
        state.expiry_date = None;
        state.destroyed = true;
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.inner.state.lock())
    }

    // Mutations that are also reads (flash consumption, clear) stay silent on a
    // destroyed session: there is nothing left to remove.
    fn read_mut<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    fn write(&self, f: impl FnOnce(&mut State)) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed);
        }
        f(&mut state);
        Ok(())
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
