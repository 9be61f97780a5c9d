//! Walks a pipeline and builds the timely operators for it.
//!
//! Primitive transforms are visited in dependency order. Every
//! transform's kind is resolved before anything is built, so a
//! pipeline with an unknown transform fails without binding a single
//! stream.

use opentelemetry::KeyValue;
use timely::dataflow::Scope;

use crate::context::TranslationContext;
use crate::errors::Error;
use crate::errors::Result;
use crate::metrics;
use crate::pipeline::urns;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::translators::*;
use crate::with_timer;

/// The primitive transforms this runner knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    Flatten,
    Impulse,
    AssignWindows,
    GroupByKey,
    Reshuffle,
    ExecutableStage,
}

impl TransformKind {
    pub fn from_urn(urn: &str) -> Option<Self> {
        match urn {
            urns::FLATTEN => Some(Self::Flatten),
            urns::IMPULSE => Some(Self::Impulse),
            urns::ASSIGN_WINDOWS => Some(Self::AssignWindows),
            urns::GROUP_BY_KEY => Some(Self::GroupByKey),
            urns::RESHUFFLE => Some(Self::Reshuffle),
            urns::EXECUTABLE_STAGE => Some(Self::ExecutableStage),
            _ => None,
        }
    }

    pub fn urn(&self) -> &'static str {
        match self {
            Self::Flatten => urns::FLATTEN,
            Self::Impulse => urns::IMPULSE,
            Self::AssignWindows => urns::ASSIGN_WINDOWS,
            Self::GroupByKey => urns::GROUP_BY_KEY,
            Self::Reshuffle => urns::RESHUFFLE,
            Self::ExecutableStage => urns::EXECUTABLE_STAGE,
        }
    }
}

/// Translate every primitive transform of `pipeline` into `ctx`.
///
/// Collections that no transform produces must already be bound in
/// `ctx`. On error, `ctx` may hold some bindings and the dataflow
/// being built must not be run.
pub fn translate<S>(ctx: &mut TranslationContext<S>, pipeline: &Pipeline) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let order = pipeline.topological_order()?;

    let resolved = order
        .iter()
        .map(|transform_id| {
            let transform = pipeline.transform(transform_id)?;
            let kind = TransformKind::from_urn(&transform.spec.urn).ok_or_else(|| {
                Error::UnknownTransformKind {
                    urn: transform.spec.urn.clone(),
                    transform_id: transform_id.clone(),
                }
            })?;
            Ok((transform_id.as_str(), transform, kind))
        })
        .collect::<Result<Vec<_>>>()?;

    let histogram = metrics::translate_step_duration();
    for (transform_id, transform, kind) in resolved {
        let labels = vec![
            KeyValue::new("urn", kind.urn()),
            KeyValue::new("worker_id", ctx.scope().index().to_string()),
        ];
        tracing::debug_span!("translate", transform_id, urn = kind.urn()).in_scope(|| {
            with_timer!(
                histogram,
                labels,
                translate_one(kind, transform_id, transform, pipeline, ctx)
            )
        })?;
    }
    Ok(())
}

fn translate_one<S>(
    kind: TransformKind,
    transform_id: &str,
    transform: &Transform,
    pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    tracing::debug!("Translating {kind:?}");
    match kind {
        TransformKind::Flatten => translate_flatten(transform_id, transform, pipeline, ctx),
        TransformKind::Impulse => translate_impulse(transform_id, transform, pipeline, ctx),
        TransformKind::AssignWindows => {
            translate_assign_windows(transform_id, transform, pipeline, ctx)
        }
        TransformKind::GroupByKey => {
            translate_group_by_key(transform_id, transform, pipeline, ctx)
        }
        TransformKind::Reshuffle => translate_reshuffle(transform_id, transform, pipeline, ctx),
        TransformKind::ExecutableStage => {
            translate_executable_stage(transform_id, transform, pipeline, ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;
    use crate::coders::Coder;
    use crate::coders::CoderError;
    use crate::coders::CoderRegistry;
    use crate::coders::StringUtf8Coder;
    use crate::pipeline::WindowingStrategySpec;
    use crate::testing::translate_and_capture;
    use crate::testing::translate_and_capture_with;
    use crate::testing::translate_and_capture_workers;
    use crate::testing::PipelineBuilder;
    use crate::translators::impulse::impulse_element;
    use crate::values::PaneInfo;
    use crate::values::Value;
    use crate::values::WindowedValue;
    use crate::window::from_millis;
    use crate::window::FixedWindows;
    use crate::window::IntervalWindow;
    use crate::window::Sessions;
    use crate::window::SlidingWindows;
    use crate::window::TimestampCombiner;
    use crate::window::Window;
    use crate::window::WindowFn;
    use crate::window::WindowIntoPayload;

    fn bytes(s: &str) -> WindowedValue {
        WindowedValue::in_global_window(Value::Bytes(s.as_bytes().to_vec()))
    }

    fn kv_at(key: &str, value: i64, at: i64) -> WindowedValue {
        WindowedValue::timestamped(Value::kv(key, value), from_millis(at), Window::Global)
    }

    fn interval(start: i64, end: i64) -> Window {
        Window::Interval(IntervalWindow::from_millis(start, end))
    }

    fn fixed(size: i64) -> WindowFn {
        WindowFn::Fixed(FixedWindows::new(
            Duration::milliseconds(size),
            Duration::zero(),
        ))
    }

    fn window_into(window_fn: &WindowFn) -> Vec<u8> {
        WindowIntoPayload {
            window_fn: window_fn.to_spec(),
        }
        .encode()
    }

    fn grouped(key: &str, values: &[i64], at: i64, window: Window) -> WindowedValue {
        WindowedValue::new(
            Value::kv(
                key,
                values.iter().map(|v| Value::Int(*v)).collect::<Vec<_>>(),
            ),
            from_millis(at),
            vec![window],
            PaneInfo::ON_TIME_AND_ONLY_FIRING,
        )
    }

    /// `raw` (global) -> window into -> `windowed` -> group by key ->
    /// `grouped`, with string keys and int values.
    fn grouping_pipeline(window_fn: WindowFn, combiner: TimestampCombiner) -> PipelineBuilder {
        let mut builder = PipelineBuilder::new();
        builder
            .coder("str", urns::STRING_UTF8_CODER, &[])
            .coder("int", urns::VARINT_CODER, &[])
            .coder("ints", urns::ITERABLE_CODER, &["int"])
            .coder("kv", urns::KV_CODER, &["str", "int"])
            .coder("grouped", urns::KV_CODER, &["str", "ints"])
            .windowing_strategy_spec(
                "windowed",
                WindowingStrategySpec {
                    window_fn: window_fn.to_spec(),
                    allowed_lateness_millis: 0,
                    timestamp_combiner: combiner,
                },
            )
            .typed_collection("raw", "kv", crate::testing::GLOBAL)
            .typed_collection("windowed", "kv", "windowed")
            .typed_collection("grouped", "grouped", "windowed")
            .transform_with_payload(
                "window",
                urns::ASSIGN_WINDOWS,
                window_into(&window_fn),
                &["raw"],
                &["windowed"],
            )
            .transform("gbk", urns::GROUP_BY_KEY, &["windowed"], &["grouped"]);
        builder
    }

    #[test]
    fn test_transform_kind_urns() {
        for kind in [
            TransformKind::Flatten,
            TransformKind::Impulse,
            TransformKind::AssignWindows,
            TransformKind::GroupByKey,
            TransformKind::Reshuffle,
            TransformKind::ExecutableStage,
        ] {
            assert_eq!(TransformKind::from_urn(kind.urn()), Some(kind));
        }
        assert_eq!(TransformKind::from_urn("beam:transform:pardo:v1"), None);
    }

    #[test]
    fn test_flatten_is_multiset_union() {
        let pipeline = PipelineBuilder::new()
            .transform("flatten", urns::FLATTEN, &["a", "b"], &["out"])
            .build();

        let out = translate_and_capture(
            &pipeline,
            vec![
                ("a", vec![bytes("x"), bytes("y")]),
                ("b", vec![bytes("y"), bytes("z")]),
            ],
            &["out"],
        )
        .unwrap();
        assert_eq!(
            out["out"],
            vec![bytes("x"), bytes("y"), bytes("y"), bytes("z")]
        );
    }

    #[test]
    fn test_flatten_counts_repeated_input() {
        // Same collection as three inputs.
        let pipeline = PipelineBuilder::new()
            .transform("flatten", urns::FLATTEN, &["a", "a", "a"], &["out"])
            .build();

        let out = translate_and_capture(&pipeline, vec![("a", vec![bytes("x")])], &["out"]).unwrap();
        assert_eq!(out["out"], vec![bytes("x"), bytes("x"), bytes("x")]);
    }

    #[test]
    fn test_flatten_of_nothing_is_empty() {
        let pipeline = PipelineBuilder::new()
            .transform("flatten", urns::FLATTEN, &[], &["out"])
            .build();

        let out = translate_and_capture(&pipeline, Vec::new(), &["out"]).unwrap();
        assert_eq!(out["out"], Vec::new());
    }

    #[test]
    fn test_impulse_emits_once() {
        let pipeline = PipelineBuilder::new()
            .transform("impulse", urns::IMPULSE, &[], &["out"])
            .build();

        let out = translate_and_capture(&pipeline, Vec::new(), &["out"]).unwrap();
        assert_eq!(out["out"], vec![impulse_element()]);
        assert_eq!(out["out"][0].value, Value::Bytes(Vec::new()));
        assert_eq!(out["out"][0].pane, PaneInfo::NO_FIRING);
    }

    #[test]
    fn test_impulse_then_flatten() {
        let pipeline = PipelineBuilder::new()
            .transform("impulse", urns::IMPULSE, &[], &["imp"])
            .transform("flatten", urns::FLATTEN, &["imp", "ext"], &["out"])
            .build();

        let out =
            translate_and_capture(&pipeline, vec![("ext", vec![bytes("x")])], &["out"]).unwrap();
        let mut expected = vec![impulse_element(), bytes("x")];
        expected.sort();
        assert_eq!(out["out"], expected);
    }

    #[test]
    fn test_reshuffle_passes_elements_unchanged() {
        let pipeline = PipelineBuilder::new()
            .coder("int", urns::VARINT_CODER, &[])
            .coder("kv", urns::KV_CODER, &[crate::testing::BYTES, "int"])
            .windowing_strategy("fixed", fixed(10), 0)
            .typed_collection("in", "kv", "fixed")
            .transform("reshuffle", urns::RESHUFFLE, &["in"], &["out"])
            .build();
        let elements = vec![
            WindowedValue::new(
                Value::kv(Value::Bytes(b"a".to_vec()), 1i64),
                from_millis(5),
                vec![interval(0, 10)],
                PaneInfo::NO_FIRING,
            ),
            WindowedValue::new(
                Value::kv(Value::Bytes(b"b".to_vec()), -2i64),
                from_millis(-3),
                vec![interval(-10, 0)],
                PaneInfo::ON_TIME_AND_ONLY_FIRING,
            ),
        ];

        let out =
            translate_and_capture(&pipeline, vec![("in", elements.clone())], &["out"]).unwrap();
        let mut expected = elements;
        expected.sort();
        assert_eq!(out["out"], expected);
    }

    #[test]
    #[should_panic(expected = "can't encode")]
    fn test_reshuffle_panics_on_coder_mismatch() {
        let pipeline = PipelineBuilder::new()
            .transform("reshuffle", urns::RESHUFFLE, &["in"], &["out"])
            .build();
        let element = WindowedValue::in_global_window(Value::Int(1));

        let _ = translate_and_capture(&pipeline, vec![("in", vec![element])], &["out"]);
    }

    #[test]
    fn test_assign_windows() {
        let sliding = WindowFn::Sliding(SlidingWindows::new(
            Duration::milliseconds(10),
            Duration::milliseconds(5),
            Duration::zero(),
        ));
        let pipeline = PipelineBuilder::new()
            .windowing_strategy("sliding", sliding.clone(), 0)
            .typed_collection("out", crate::testing::BYTES, "sliding")
            .transform_with_payload(
                "window",
                urns::ASSIGN_WINDOWS,
                window_into(&sliding),
                &["in"],
                &["out"],
            )
            .build();
        let element = WindowedValue::timestamped(
            Value::Bytes(b"x".to_vec()),
            from_millis(7),
            Window::Global,
        );

        let out = translate_and_capture(&pipeline, vec![("in", vec![element])], &["out"]).unwrap();
        assert_eq!(
            out["out"],
            vec![WindowedValue::new(
                Value::Bytes(b"x".to_vec()),
                from_millis(7),
                vec![interval(0, 10), interval(5, 15)],
                PaneInfo::NO_FIRING,
            )]
        );
    }

    #[test]
    fn test_assign_windows_malformed_payload() {
        let pipeline = PipelineBuilder::new()
            .transform_with_payload(
                "window",
                urns::ASSIGN_WINDOWS,
                b"not json".to_vec(),
                &["in"],
                &["out"],
            )
            .build();

        let err = translate_and_capture(&pipeline, vec![("in", Vec::new())], &[]).unwrap_err();
        assert!(
            matches!(&err, Error::MalformedPayload { descriptor, .. } if descriptor == "not json"),
            "{err:?}"
        );
    }

    #[test]
    fn test_assign_windows_is_idempotent() {
        let sliding = WindowFn::Sliding(SlidingWindows::new(
            Duration::milliseconds(10),
            Duration::milliseconds(5),
            Duration::milliseconds(2),
        ));
        let pipeline = PipelineBuilder::new()
            .transform_with_payload(
                "once",
                urns::ASSIGN_WINDOWS,
                window_into(&sliding),
                &["in"],
                &["windowed"],
            )
            .transform_with_payload(
                "twice",
                urns::ASSIGN_WINDOWS,
                window_into(&sliding),
                &["windowed"],
                &["rewindowed"],
            )
            .build();
        let elements = [-7, 0, 3, 7, 12]
            .into_iter()
            .map(|at| {
                WindowedValue::timestamped(Value::Bytes(b"x".to_vec()), from_millis(at), Window::Global)
            })
            .collect();

        let out = translate_and_capture(
            &pipeline,
            vec![("in", elements)],
            &["windowed", "rewindowed"],
        )
        .unwrap();
        assert_eq!(out["windowed"].len(), 5);
        assert_eq!(out["rewindowed"], out["windowed"]);
    }

    #[test]
    fn test_window_offset_out_of_range_is_malformed() {
        let window_fn = crate::pipeline::FunctionSpec::new(
            urns::FIXED_WINDOWS,
            format!(r#"{{"size_millis": 10, "offset_millis": {}}}"#, i64::MIN).into_bytes(),
        );

        let pipeline = PipelineBuilder::new()
            .transform_with_payload(
                "window",
                urns::ASSIGN_WINDOWS,
                WindowIntoPayload {
                    window_fn: window_fn.clone(),
                }
                .encode(),
                &["in"],
                &["out"],
            )
            .build();
        let err = translate_and_capture(&pipeline, vec![("in", Vec::new())], &[]).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }), "{err:?}");

        let pipeline = PipelineBuilder::new()
            .coder("kv", urns::KV_CODER, &[crate::testing::BYTES, crate::testing::BYTES])
            .windowing_strategy_spec(
                "bad",
                WindowingStrategySpec {
                    window_fn,
                    allowed_lateness_millis: 0,
                    timestamp_combiner: TimestampCombiner::EndOfWindow,
                },
            )
            .typed_collection("in", "kv", "bad")
            .transform("impulse", urns::IMPULSE, &[], &["in"])
            .transform("gbk", urns::GROUP_BY_KEY, &["in"], &["out"])
            .build();
        let err = translate_and_capture(&pipeline, Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }), "{err:?}");
    }

    #[test]
    fn test_assign_windows_custom_window_fn() {
        let custom = WindowFn::Custom(crate::pipeline::FunctionSpec::new(
            "beam:window_fn:custom:v1",
            Vec::new(),
        ));
        let pipeline = PipelineBuilder::new()
            .transform_with_payload(
                "window",
                urns::ASSIGN_WINDOWS,
                window_into(&custom),
                &["in"],
                &["out"],
            )
            .build();

        let err = translate_and_capture(&pipeline, vec![("in", Vec::new())], &[]).unwrap_err();
        assert!(
            matches!(&err, Error::UnsupportedWindowFn { urn } if urn == "beam:window_fn:custom:v1"),
            "{err:?}"
        );
    }

    #[test]
    fn test_group_by_key_fixed_windows() {
        let pipeline = grouping_pipeline(fixed(10), TimestampCombiner::EndOfWindow).build();
        let elements = vec![
            kv_at("a", 1, 1),
            kv_at("a", 2, 5),
            kv_at("b", 3, 7),
            kv_at("a", 4, 12),
        ];

        let out = translate_and_capture(&pipeline, vec![("raw", elements)], &["grouped"]).unwrap();
        assert_eq!(
            out["grouped"],
            vec![
                grouped("a", &[1, 2], 9, interval(0, 10)),
                grouped("a", &[4], 19, interval(10, 20)),
                grouped("b", &[3], 9, interval(0, 10)),
            ]
        );
    }

    #[test]
    fn test_group_by_key_global_window() {
        let pipeline = grouping_pipeline(WindowFn::Global, TimestampCombiner::EndOfWindow).build();
        let elements = vec![kv_at("a", 1, 1), kv_at("a", 2, 500)];

        let out = translate_and_capture(&pipeline, vec![("raw", elements)], &["grouped"]).unwrap();
        assert_eq!(
            out["grouped"],
            vec![WindowedValue::new(
                Value::kv("a", vec![Value::Int(1), Value::Int(2)]),
                Window::Global.max_timestamp(),
                vec![Window::Global],
                PaneInfo::ON_TIME_AND_ONLY_FIRING,
            )]
        );
    }

    #[test]
    fn test_group_by_key_sessions() {
        let sessions = WindowFn::Sessions(Sessions::new(Duration::milliseconds(10)));
        let pipeline = grouping_pipeline(sessions, TimestampCombiner::EndOfWindow).build();
        let elements = vec![kv_at("a", 1, 0), kv_at("a", 2, 5), kv_at("a", 3, 30)];

        let out = translate_and_capture(&pipeline, vec![("raw", elements)], &["grouped"]).unwrap();
        assert_eq!(
            out["grouped"],
            vec![
                grouped("a", &[1, 2], 14, interval(0, 15)),
                grouped("a", &[3], 39, interval(30, 40)),
            ]
        );
    }

    #[test]
    fn test_group_by_key_earliest_timestamp() {
        let pipeline = grouping_pipeline(fixed(10), TimestampCombiner::Earliest).build();
        let elements = vec![kv_at("a", 1, 6), kv_at("a", 2, 3)];

        let out = translate_and_capture(&pipeline, vec![("raw", elements)], &["grouped"]).unwrap();
        assert_eq!(
            out["grouped"],
            vec![grouped("a", &[1, 2], 3, interval(0, 10))]
        );
    }

    #[test]
    fn test_group_by_key_sends_each_key_to_one_worker() {
        let pipeline = grouping_pipeline(fixed(10), TimestampCombiner::EndOfWindow).build();
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let elements = keys
            .iter()
            .flat_map(|key| [1, 5, 12].map(|at| kv_at(key, at, at)))
            .collect();

        let per_worker =
            translate_and_capture_workers(&pipeline, 3, vec![("raw", elements)], "grouped")
                .unwrap();

        let mut workers_by_key: BTreeMap<Value, BTreeSet<usize>> = BTreeMap::new();
        for (worker, outputs) in per_worker.iter().enumerate() {
            for output in outputs {
                let (key, _values) = output.value.clone().into_kv().unwrap();
                workers_by_key.entry(key).or_default().insert(worker);
            }
        }
        assert_eq!(workers_by_key.len(), keys.len());
        for (key, workers) in &workers_by_key {
            assert_eq!(workers.len(), 1, "{key:?} was grouped on {workers:?}");
        }

        let mut all: Vec<WindowedValue> = per_worker.into_iter().flatten().collect();
        all.sort();
        let mut expected: Vec<WindowedValue> = keys
            .iter()
            .flat_map(|key| {
                [
                    grouped(key, &[1, 5], 9, interval(0, 10)),
                    grouped(key, &[12], 19, interval(10, 20)),
                ]
            })
            .collect();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_reshuffle_across_workers_keeps_every_element() {
        let pipeline = PipelineBuilder::new()
            .transform("reshuffle", urns::RESHUFFLE, &["in"], &["out"])
            .build();
        let mut elements: Vec<WindowedValue> =
            (0..50).map(|i| bytes(&(i % 20).to_string())).collect();

        let per_worker =
            translate_and_capture_workers(&pipeline, 3, vec![("in", elements.clone())], "out")
                .unwrap();

        let mut all: Vec<WindowedValue> = per_worker.into_iter().flatten().collect();
        all.sort();
        elements.sort();
        assert_eq!(all, elements);
    }

    #[test]
    fn test_group_by_key_requires_kv_coder() {
        let pipeline = PipelineBuilder::new()
            .transform("gbk", urns::GROUP_BY_KEY, &["in"], &["out"])
            .build();

        let err = translate_and_capture(&pipeline, vec![("in", Vec::new())], &[]).unwrap_err();
        assert!(
            matches!(&err, Error::UnexpectedCoder { coder_id, .. } if coder_id == crate::testing::BYTES),
            "{err:?}"
        );
    }

    #[test]
    fn test_group_by_key_uses_registered_key_coder() {
        // Keys are compared by their encoding, so a coder that
        // ignores case merges "A" and "a".
        #[derive(Debug)]
        struct CaseInsensitive;

        impl Coder for CaseInsensitive {
            fn encode(
                &self,
                value: &Value,
                out: &mut Vec<u8>,
            ) -> std::result::Result<(), CoderError> {
                match value {
                    Value::String(s) => StringUtf8Coder.encode(&Value::from(s.to_lowercase()), out),
                    other => StringUtf8Coder.encode(other, out),
                }
            }

            fn decode(
                &self,
                input: &mut &[u8],
            ) -> std::result::Result<Value, CoderError> {
                StringUtf8Coder.decode(input)
            }
        }

        let mut builder = grouping_pipeline(WindowFn::Global, TimestampCombiner::EndOfWindow);
        builder.coder("str", "example:coder:case_insensitive:v1", &[]);
        let pipeline = builder.build();
        let mut coders = CoderRegistry::new();
        coders.register("example:coder:case_insensitive:v1", |_spec, _components| {
            let coder: std::sync::Arc<dyn Coder> =
                std::sync::Arc::new(CaseInsensitive);
            Ok(coder)
        });

        let elements = vec![kv_at("a", 1, 0), kv_at("A", 2, 0)];
        let out =
            translate_and_capture_with(&pipeline, coders, vec![("raw", elements)], &["grouped"])
                .unwrap();
        assert_eq!(out["grouped"].len(), 1);
        let (_key, values) = out["grouped"][0].value.clone().into_kv().unwrap();
        assert_eq!(values, Value::Iterable(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_unknown_urn_fails_before_binding() {
        let pipeline = PipelineBuilder::new()
            .transform("impulse", urns::IMPULSE, &[], &["imp"])
            .transform("pardo", "beam:transform:pardo:v1", &["imp"], &["out"])
            .build();

        let err = translate_and_capture(&pipeline, Vec::new(), &[]).unwrap_err();
        assert!(
            matches!(
                &err,
                Error::UnknownTransformKind { urn, transform_id }
                    if urn == "beam:transform:pardo:v1" && transform_id == "pardo"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn test_unknown_urn_leaves_context_empty() {
        let pipeline = PipelineBuilder::new()
            .transform("impulse", urns::IMPULSE, &[], &["imp"])
            .transform("pardo", "beam:transform:pardo:v1", &["imp"], &["out"])
            .build();

        timely::execute_directly(move |worker| {
            worker.dataflow::<u64, _, _>(|scope| {
                let mut ctx = TranslationContext::new(
                    scope.clone(),
                    crate::options::PipelineOptions::default(),
                    std::sync::Arc::new(CoderRegistry::new()),
                );
                assert!(translate(&mut ctx, &pipeline).is_err());
                assert_eq!(ctx.streams().count(), 0);
            });
        });
    }

    #[test]
    fn test_executable_stage_not_implemented() {
        let pipeline = PipelineBuilder::new()
            .transform("stage", urns::EXECUTABLE_STAGE, &["in"], &["out"])
            .build();

        let err = translate_and_capture(&pipeline, vec![("in", Vec::new())], &[]).unwrap_err();
        assert!(
            matches!(
                &err,
                Error::NotImplemented { urn, transform_id }
                    if urn == urns::EXECUTABLE_STAGE && transform_id == "stage"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn test_missing_input_binding() {
        let pipeline = PipelineBuilder::new()
            .transform("reshuffle", urns::RESHUFFLE, &["in"], &["out"])
            .build();

        let err = translate_and_capture(&pipeline, Vec::new(), &[]).unwrap_err();
        assert!(
            matches!(&err, Error::CollectionNotBound(id) if id == "in"),
            "{err:?}"
        );
    }
}
