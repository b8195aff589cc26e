//! Correlation of fragments from independent call sites.
//!
//! Key setup and per-block encrypt/decrypt calls are decoupled in the cipher
//! library, so the probe keeps the latest key/IV/nonce/secret until a payload
//! arrives, then emits them together and starts over. There is no timeout
//! and no operation identity: under `CorrelationScope::Global` a key set up
//! for one operation is attached to whichever payload fires next, even if it
//! belongs to another operation. `CorrelationScope::PerThread` narrows that to
//! payloads seen on the same target thread.
//!
//! Under `PerThread` a thread's entry is dropped when it emits. A thread that
//! records fragments and exits without a payload keeps its entry until the
//! host reports the exit through `CorrelationContext::forget_thread`.

use crate::probe::descriptor::FragmentKind;
use crate::probe::event::CryptoEvent;
use crate::probe::sink::EventSink;
use crate::probe::tags::SymbolTags;
use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One formatted buffer taken from an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFragment {
    pub kind: FragmentKind,
    pub value: String,
}

impl CapturedFragment {
    pub fn new(kind: FragmentKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Where accumulated fragments are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationScope {
    /// One state for the whole session
    #[default]
    Global,
    /// One state per target thread
    PerThread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Accumulating,
}

/// Fragments recorded since the last emitted event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationState {
    pub key: Option<String>,
    pub iv: Option<String>,
    pub nonce: Option<String>,
    pub secret: Option<String>,
}

impl CorrelationState {
    pub fn phase(&self) -> Phase {
        if self.key.is_none() && self.iv.is_none() && self.nonce.is_none() && self.secret.is_none() {
            Phase::Empty
        } else {
            Phase::Accumulating
        }
    }

    /// Overwrites the field for `kind`. Payloads are not stored; returns
    /// false for them.
    pub fn record(&mut self, kind: FragmentKind, value: String) -> bool {
        let field = match kind {
            FragmentKind::Key => &mut self.key,
            FragmentKind::Iv => &mut self.iv,
            FragmentKind::Nonce => &mut self.nonce,
            FragmentKind::Secret => &mut self.secret,
            FragmentKind::Payload => return false,
        };
        *field = Some(value);
        true
    }

    /// Builds an event from the accumulated fields and resets all of them.
    pub fn emit(
        &mut self,
        sequence: u64,
        thread_id: u64,
        payload: String,
        tags: Option<SymbolTags>,
    ) -> CryptoEvent {
        let taken = std::mem::take(self);
        let SymbolTags { algorithm, action } = tags.unwrap_or_default();

        CryptoEvent {
            sequence,
            thread_id,
            captured_at: Utc::now(),
            action,
            payload,
            algorithm,
            key: taken.key,
            iv: taken.iv,
            nonce: taken.nonce,
            secret: taken.secret,
        }
    }
}

#[derive(Debug, Default)]
struct Correlations {
    global: CorrelationState,
    per_thread: HashMap<u64, CorrelationState>,
    emitted: u64,
}

impl Correlations {
    fn state_mut(&mut self, scope: CorrelationScope, thread_id: u64) -> &mut CorrelationState {
        match scope {
            CorrelationScope::Global => &mut self.global,
            CorrelationScope::PerThread => self.per_thread.entry(thread_id).or_default(),
        }
    }

    fn state(&self, scope: CorrelationScope, thread_id: u64) -> CorrelationState {
        match scope {
            CorrelationScope::Global => self.global.clone(),
            CorrelationScope::PerThread => self.per_thread.get(&thread_id).cloned().unwrap_or_default(),
        }
    }
}

/// Session-wide correlation shared by every interception listener.
pub struct CorrelationContext {
    scope: CorrelationScope,
    inner: Mutex<Correlations>,
    sink: Arc<dyn EventSink>,
}

impl CorrelationContext {
    pub fn new(scope: CorrelationScope, sink: Arc<dyn EventSink>) -> Self {
        Self {
            scope,
            inner: Mutex::new(Correlations::default()),
            sink,
        }
    }

    pub fn scope(&self) -> CorrelationScope {
        self.scope
    }

    fn lock(&self) -> MutexGuard<'_, Correlations> {
        // A panicking listener must not disable correlation for the session
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("Correlation state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Applies every fragment of one invocation in a single critical section.
    ///
    /// Non-payload fragments are recorded first. If a payload is among them,
    /// the state is emitted and reset before the lock is released, and the
    /// event is handed to the sink afterwards. Returns the emitted sequence.
    pub fn deliver(
        &self,
        thread_id: u64,
        fragments: Vec<CapturedFragment>,
        tags: Option<SymbolTags>,
    ) -> Option<u64> {
        let event = {
            let mut inner = self.lock();
            let mut payload = None;

            let state = inner.state_mut(self.scope, thread_id);
            for fragment in fragments {
                if fragment.kind == FragmentKind::Payload {
                    payload = Some(fragment.value);
                } else {
                    state.record(fragment.kind, fragment.value);
                }
            }

            match payload {
                Some(payload) => {
                    inner.emitted += 1;
                    let sequence = inner.emitted;
                    let event = inner
                        .state_mut(self.scope, thread_id)
                        .emit(sequence, thread_id, payload, tags);
                    if self.scope == CorrelationScope::PerThread {
                        inner.per_thread.remove(&thread_id);
                    }
                    Some(event)
                }
                None => None,
            }
        };

        event.map(|event| {
            let sequence = event.sequence;
            self.sink.on_crypto_event(event);
            sequence
        })
    }

    /// Records a single non-payload fragment.
    pub fn record(&self, thread_id: u64, kind: FragmentKind, value: impl Into<String>) {
        self.deliver(thread_id, vec![CapturedFragment::new(kind, value)], None);
    }

    /// Emits the accumulated state with `payload` and resets it.
    pub fn emit_on(
        &self,
        thread_id: u64,
        action: &str,
        payload: impl Into<String>,
        algorithm: &str,
    ) -> Option<u64> {
        let tags = SymbolTags {
            algorithm: Some(algorithm.to_string()),
            action: Some(action.to_string()),
        };
        self.deliver(
            thread_id,
            vec![CapturedFragment::new(FragmentKind::Payload, payload)],
            Some(tags),
        )
    }

    /// Drops the fragments kept for a target thread that has exited.
    /// Returns whether it had any. Has no effect under `Global`.
    pub fn forget_thread(&self, thread_id: u64) -> bool {
        self.lock().per_thread.remove(&thread_id).is_some()
    }

    /// Number of target threads with fragments pending.
    pub fn pending_threads(&self) -> usize {
        self.lock().per_thread.len()
    }

    /// Phase of the state a call from `thread_id` would see.
    pub fn phase(&self, thread_id: u64) -> Phase {
        self.snapshot(thread_id).phase()
    }

    /// Copy of the state a call from `thread_id` would see.
    pub fn snapshot(&self, thread_id: u64) -> CorrelationState {
        self.lock().state(self.scope, thread_id)
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.lock().emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::sink::CollectingSink;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::collections::HashSet;
    use std::thread;

    fn context(scope: CorrelationScope) -> (Arc<CollectingSink>, CorrelationContext) {
        let sink = Arc::new(CollectingSink::new());
        let context = CorrelationContext::new(scope, sink.clone());
        (sink, context)
    }

    #[test]
    fn test_state_phases() {
        let mut state = CorrelationState::default();
        assert_eq!(state.phase(), Phase::Empty);
        assert!(state.record(FragmentKind::Key, "0xaa".to_string()));
        assert_eq!(state.phase(), Phase::Accumulating);
        assert!(!state.record(FragmentKind::Payload, "HELLO".to_string()));

        let event = state.emit(1, 1, "HELLO".to_string(), None);
        assert_eq!(event.key.as_deref(), Some("0xaa"));
        assert_eq!(event.action, None);
        assert_eq!(state.phase(), Phase::Empty);
    }

    #[test]
    fn test_record_overwrites_only_its_field() {
        let (_, context) = context(CorrelationScope::Global);
        context.record(1, FragmentKind::Key, "0x01");
        context.record(1, FragmentKind::Iv, "0x02");
        context.record(1, FragmentKind::Key, "0x03");

        let state = context.snapshot(1);
        assert_eq!(state.key.as_deref(), Some("0x03"));
        assert_eq!(state.iv.as_deref(), Some("0x02"));
        assert_eq!(state.nonce, None);
    }

    #[test]
    fn test_emit_resets_every_field() {
        let (sink, context) = context(CorrelationScope::Global);
        context.record(1, FragmentKind::Key, "0xaabbcc");
        context.record(1, FragmentKind::Iv, "0x010203");
        context.record(1, FragmentKind::Nonce, "0x99");
        context.record(1, FragmentKind::Secret, "s3cr3t");

        assert_eq!(context.emit_on(1, "encrypt", "HELLO", "CBC"), Some(1));
        assert_eq!(context.phase(1), Phase::Empty);

        assert_eq!(context.emit_on(1, "encrypt", "AGAIN", "CBC"), Some(2));
        let events = sink.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].secret.as_deref(), Some("s3cr3t"));
        assert_eq!(events[1].key, None);
        assert_eq!(events[1].iv, None);
        assert_eq!(events[1].nonce, None);
        assert_eq!(events[1].secret, None);
        assert_eq!(events[1].payload, "AGAIN");
    }

    #[test]
    fn test_global_scope_crosses_threads() {
        let (sink, context) = context(CorrelationScope::Global);
        context.record(1, FragmentKind::Key, "0x01");
        context.emit_on(2, "decrypt", "0xff", "ECB");

        let events = sink.events().unwrap();
        assert_eq!(events[0].key.as_deref(), Some("0x01"));
        assert_eq!(events[0].thread_id, 2);
    }

    #[test]
    fn test_per_thread_scope_isolates_threads() {
        let (sink, context) = context(CorrelationScope::PerThread);
        context.record(1, FragmentKind::Key, "0x01");
        context.record(2, FragmentKind::Key, "0x02");
        context.emit_on(2, "decrypt", "0xff", "ECB");

        assert_eq!(context.phase(1), Phase::Accumulating);
        assert_eq!(context.phase(2), Phase::Empty);
        assert_eq!(sink.events().unwrap()[0].key.as_deref(), Some("0x02"));
    }

    #[test]
    fn test_exited_threads_can_be_forgotten() {
        let (sink, context) = context(CorrelationScope::PerThread);
        for tid in 1..=50 {
            context.record(tid, FragmentKind::Key, format!("0x{:02x}", tid));
        }
        assert_eq!(context.pending_threads(), 50);

        context.emit_on(7, "encrypt", "HELLO", "CBC");
        assert_eq!(context.pending_threads(), 49);

        assert!(context.forget_thread(8));
        assert!(!context.forget_thread(8));
        assert_eq!(context.pending_threads(), 48);
        assert_eq!(context.phase(8), Phase::Empty);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_fragments_of_one_invocation_apply_before_emit() {
        let (sink, context) = context(CorrelationScope::Global);
        context.deliver(
            1,
            vec![
                CapturedFragment::new(FragmentKind::Payload, "HELLO"),
                CapturedFragment::new(FragmentKind::Nonce, "0x0102"),
            ],
            None,
        );
        let events = sink.events().unwrap();
        assert_eq!(events[0].nonce.as_deref(), Some("0x0102"));
        assert_eq!(context.phase(1), Phase::Empty);
    }

    #[test]
    fn test_concurrent_per_thread_operations_never_bleed() {
        const THREADS: u64 = 8;
        const OPERATIONS: u64 = 200;

        let (sink, context) = context(CorrelationScope::PerThread);
        let context = Arc::new(context);

        let handles: Vec<_> = (1..=THREADS)
            .map(|tid| {
                let context = context.clone();
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    for op in 0..OPERATIONS {
                        let mut steps = vec![FragmentKind::Key, FragmentKind::Iv];
                        steps.shuffle(&mut rng);
                        for kind in steps {
                            context.record(tid, kind, format!("{}-{}-{}", kind, tid, op));
                            if rng.random_bool(0.3) {
                                thread::yield_now();
                            }
                        }
                        context.emit_on(tid, "encrypt", format!("payload-{}-{}", tid, op), "CBC");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = sink.events().unwrap();
        assert_eq!(events.len() as u64, THREADS * OPERATIONS);
        for event in &events {
            let suffix = event.payload.trim_start_matches("payload-");
            assert_eq!(event.key, Some(format!("key-{}", suffix)));
            assert_eq!(event.iv, Some(format!("iv-{}", suffix)));
        }
    }

    #[test]
    fn test_concurrent_global_scope_consumes_each_fragment_once() {
        const THREADS: u64 = 6;
        const OPERATIONS: u64 = 150;

        let (sink, context) = context(CorrelationScope::Global);
        let context = Arc::new(context);

        let handles: Vec<_> = (1..=THREADS)
            .map(|tid| {
                let context = context.clone();
                thread::spawn(move || {
                    for op in 0..OPERATIONS {
                        // Key and payload in one invocation, so the pair is atomic
                        context.deliver(
                            tid,
                            vec![
                                CapturedFragment::new(FragmentKind::Key, format!("key-{}-{}", tid, op)),
                                CapturedFragment::new(
                                    FragmentKind::Payload,
                                    format!("payload-{}-{}", tid, op),
                                ),
                            ],
                            None,
                        );
                        context.record(tid, FragmentKind::Iv, format!("iv-{}-{}", tid, op));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = sink.events().unwrap();
        let mut seen_ivs = HashSet::new();
        let mut sequences = HashSet::new();
        for event in &events {
            let suffix = event.payload.trim_start_matches("payload-");
            assert_eq!(event.key, Some(format!("key-{}", suffix)));
            if let Some(iv) = &event.iv {
                assert!(iv.starts_with("iv-"), "torn iv {}", iv);
                assert!(seen_ivs.insert(iv.clone()), "iv {} emitted twice", iv);
            }
            assert!(sequences.insert(event.sequence));
        }
        assert_eq!(context.emitted(), THREADS * OPERATIONS);
    }
}
