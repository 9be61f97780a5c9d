//! The stateful operator behind group by key.
//!
//! Work items are routed to workers by key. Each worker keeps one
//! accumulator per (key, window) pane, created on the first value and
//! emitted exactly once, when the input watermark passes the window's
//! expiry or when the input ends. State for a pane is released as
//! soon as it fires.
//!
//! Elements for a window that has already expired against the
//! watermark are dropped as late.
//!
//! For merging window functions (sessions), a new window absorbs
//! every pending window of the same key it intersects before its
//! value is added.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use opentelemetry::KeyValue;
use timely::dataflow::channels::pact::Exchange;
use timely::dataflow::operators::generic::builder_rc::OperatorBuilder;
use timely::dataflow::Scope;
use timely::dataflow::Stream;

use crate::metrics;
use crate::operators::keyed_work_item::KeyedWorkItem;
use crate::timely::watermark_at;
use crate::timely::FrontierEx;
use crate::values::PaneInfo;
use crate::values::Value;
use crate::values::WindowedValue;
use crate::window::session_window::merge_into;
use crate::window::IntervalWindow;
use crate::window::TimestampCombiner;
use crate::window::Window;
use crate::window::WindowingStrategy;
use crate::window::MIN_TIMESTAMP;

/// How the values of a pane are combined.
pub(crate) trait ReduceFn {
    type Accumulator;

    fn create_accumulator(&self) -> Self::Accumulator;

    fn add_input(&self, acc: &mut Self::Accumulator, value: Value);

    /// Fold `other` into `acc`. Used when session windows merge.
    fn merge_accumulators(&self, acc: &mut Self::Accumulator, other: Self::Accumulator);

    fn extract_output(&self, acc: Self::Accumulator) -> Value;
}

/// Buffers every value and emits them all as an iterable.
pub(crate) struct BufferingReduceFn;

impl ReduceFn for BufferingReduceFn {
    type Accumulator = Vec<Value>;

    fn create_accumulator(&self) -> Self::Accumulator {
        Vec::new()
    }

    fn add_input(&self, acc: &mut Self::Accumulator, value: Value) {
        acc.push(value);
    }

    fn merge_accumulators(&self, acc: &mut Self::Accumulator, mut other: Self::Accumulator) {
        acc.append(&mut other);
    }

    fn extract_output(&self, acc: Self::Accumulator) -> Value {
        Value::Iterable(acc)
    }
}

struct Pane<A> {
    key: Value,
    acc: A,
    earliest: DateTime<Utc>,
    latest: DateTime<Utc>,
}

/// What happened to an element handed to [`WindowReduceState::insert`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Insertion {
    Buffered,
    /// The element's window had already expired.
    Late,
}

/// Per worker state of the windowed reduce.
pub(crate) struct WindowReduceState<R: ReduceFn> {
    reduce_fn: R,
    strategy: WindowingStrategy,
    panes: BTreeMap<(Vec<u8>, Window), Pane<R::Accumulator>>,
    /// Pending panes in firing order.
    expirations: BTreeSet<(DateTime<Utc>, Vec<u8>, Window)>,
    watermark: DateTime<Utc>,
}

impl<R: ReduceFn> WindowReduceState<R> {
    pub(crate) fn new(reduce_fn: R, strategy: WindowingStrategy) -> Self {
        Self {
            reduce_fn,
            strategy,
            panes: BTreeMap::new(),
            expirations: BTreeSet::new(),
            watermark: MIN_TIMESTAMP,
        }
    }

    pub(crate) fn insert(&mut self, item: WindowedValue<KeyedWorkItem>) -> Insertion {
        let WindowedValue {
            value: item,
            timestamp,
            windows,
            pane: _,
        } = item;
        assert!(
            windows.len() == 1,
            "work items must be in exactly one window; got {windows:?}"
        );
        let mut window = windows[0];

        if self.strategy.expiry(&window) < self.watermark {
            tracing::trace!(
                "Dropping late element at {timestamp} for window {window:?}; watermark is {}",
                self.watermark
            );
            return Insertion::Late;
        }

        let KeyedWorkItem {
            key,
            encoded_key,
            values,
        } = item;

        let mut absorbed_acc = None;
        if let (true, Window::Interval(interval)) = (self.strategy.window_fn.is_merging(), window)
        {
            let pending = self.pending_intervals(&encoded_key);
            let (merged, absorbed) = merge_into(interval, pending.iter());
            window = Window::Interval(merged);
            for absorbed in absorbed {
                let Some(pane) = self.remove_pane(&encoded_key, &Window::Interval(absorbed)) else {
                    continue;
                };
                match absorbed_acc.as_mut() {
                    None => absorbed_acc = Some(pane),
                    Some(into) => self.merge_panes(into, pane),
                }
            }
        }

        let pane_key = (encoded_key, window);
        if !self.panes.contains_key(&pane_key) {
            let expiry = self.strategy.expiry(&window);
            self.expirations.insert((expiry, pane_key.0.clone(), window));
        }
        let reduce_fn = &self.reduce_fn;
        let pane = self.panes.entry(pane_key).or_insert_with(|| Pane {
            key,
            acc: reduce_fn.create_accumulator(),
            earliest: timestamp,
            latest: timestamp,
        });
        if let Some(absorbed) = absorbed_acc {
            Self::merge_with(reduce_fn, pane, absorbed);
        }
        for value in values {
            reduce_fn.add_input(&mut pane.acc, value);
        }
        pane.earliest = pane.earliest.min(timestamp);
        pane.latest = pane.latest.max(timestamp);

        Insertion::Buffered
    }

    /// Move the watermark forward and fire every pane that expired.
    pub(crate) fn advance(&mut self, watermark: DateTime<Utc>) -> Vec<WindowedValue> {
        self.watermark = self.watermark.max(watermark);

        let mut fired = Vec::new();
        while let Some((expiry, _, _)) = self.expirations.first() {
            if *expiry >= self.watermark {
                break;
            }
            if let Some((_expiry, encoded_key, window)) = self.expirations.pop_first() {
                fired.extend(self.fire(encoded_key, window));
            }
        }
        fired
    }

    /// Fire every remaining pane, in expiry order.
    pub(crate) fn drain_all(&mut self) -> Vec<WindowedValue> {
        let mut fired = Vec::new();
        while let Some((_expiry, encoded_key, window)) = self.expirations.pop_first() {
            fired.extend(self.fire(encoded_key, window));
        }
        fired
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    fn fire(&mut self, encoded_key: Vec<u8>, window: Window) -> Option<WindowedValue> {
        let pane = self.panes.remove(&(encoded_key, window))?;
        let timestamp = match self.strategy.timestamp_combiner {
            TimestampCombiner::EndOfWindow => window.max_timestamp(),
            TimestampCombiner::Earliest => pane.earliest,
            TimestampCombiner::Latest => pane.latest,
        };
        let output = self.reduce_fn.extract_output(pane.acc);
        Some(WindowedValue::new(
            Value::kv(pane.key, output),
            timestamp,
            vec![window],
            PaneInfo::ON_TIME_AND_ONLY_FIRING,
        ))
    }

    fn merge_panes(&self, into: &mut Pane<R::Accumulator>, other: Pane<R::Accumulator>) {
        Self::merge_with(&self.reduce_fn, into, other);
    }

    fn merge_with(reduce_fn: &R, into: &mut Pane<R::Accumulator>, other: Pane<R::Accumulator>) {
        reduce_fn.merge_accumulators(&mut into.acc, other.acc);
        into.earliest = into.earliest.min(other.earliest);
        into.latest = into.latest.max(other.latest);
    }

    fn pending_intervals(&self, encoded_key: &[u8]) -> Vec<IntervalWindow> {
        self.panes
            .range((encoded_key.to_vec(), Window::Global)..)
            .take_while(|((key, _window), _pane)| key.as_slice() == encoded_key)
            .filter_map(|((_key, window), _pane)| match window {
                Window::Interval(interval) => Some(*interval),
                Window::Global => None,
            })
            .collect()
    }

    fn remove_pane(&mut self, encoded_key: &[u8], window: &Window) -> Option<Pane<R::Accumulator>> {
        let pane = self.panes.remove(&(encoded_key.to_vec(), *window))?;
        let expiry = self.strategy.expiry(window);
        self.expirations.remove(&(expiry, encoded_key.to_vec(), *window));
        Some(pane)
    }
}

/// Extension trait for [`Stream`].
pub(crate) trait WindowReduce<S>
where
    S: Scope,
{
    /// Group work items by key and window and reduce each group
    /// once its window closes.
    ///
    /// Items are exchanged so every key lands on one worker. Output
    /// elements are `(key, reduced)` pairs in the fired window.
    fn window_reduce<R>(
        &self,
        name: String,
        reduce_fn: R,
        strategy: WindowingStrategy,
        labels: Vec<KeyValue>,
    ) -> Stream<S, WindowedValue>
    where
        R: ReduceFn + 'static;
}

impl<S> WindowReduce<S> for Stream<S, WindowedValue<KeyedWorkItem>>
where
    S: Scope<Timestamp = u64>,
{
    fn window_reduce<R>(
        &self,
        name: String,
        reduce_fn: R,
        strategy: WindowingStrategy,
        labels: Vec<KeyValue>,
    ) -> Stream<S, WindowedValue>
    where
        R: ReduceFn + 'static,
    {
        let mut op_builder = OperatorBuilder::new(name, self.scope());

        let (mut output_wrapper, output_stream) = op_builder.new_output();

        let mut input_handle = op_builder.new_input(
            self,
            Exchange::new(move |item: &WindowedValue<KeyedWorkItem>| item.value.route()),
        );

        let late_elements = metrics::late_elements();
        let firings = metrics::firings();

        op_builder.build(move |mut init_caps| {
            let mut output_cap = init_caps.pop();

            let mut state = WindowReduceState::new(reduce_fn, strategy);

            // Drained and re-used each activation.
            let mut tmp_incoming = Vec::new();

            move |input_frontiers| {
                if let Some(output_cap) = output_cap.as_mut() {
                    input_handle.for_each(|_cap, incoming| {
                        assert!(tmp_incoming.is_empty());
                        incoming.swap(&mut tmp_incoming);
                        for item in tmp_incoming.drain(..) {
                            if state.insert(item) == Insertion::Late {
                                late_elements.add(1, &labels);
                            }
                        }
                    });

                    let fired = match input_frontiers.simplify() {
                        Some(frontier) => {
                            // We'll never emit anything before the
                            // frontier again.
                            output_cap.downgrade(&frontier);
                            state.advance(watermark_at(frontier))
                        }
                        // Input is over, so every window is complete.
                        None => state.drain_all(),
                    };

                    if !fired.is_empty() {
                        firings.add(fired.len() as u64, &labels);
                        let mut output_handle = output_wrapper.activate();
                        let mut output_session = output_handle.session(&output_cap);
                        output_session.give_iterator(fired.into_iter());
                    }
                }

                if input_frontiers.is_eof() {
                    debug_assert!(state.is_empty());
                    output_cap = None;
                }
            }
        });

        output_stream
    }
}
