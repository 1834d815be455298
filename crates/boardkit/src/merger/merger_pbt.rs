//! Model-equivalence test: the merger must behave like a plain ordered list
//! of `(id, title)` pairs under any sequence of insert/update/delete events.

#[cfg(test)]
mod stateful_tests {
    use super::super::ChangeFeedMerger;
    use crate::cache::PageCache;
    use crate::optimistic::MutationCoordinator;
    use boardkit_api::{ChangeEvent, Row, Value};
    use boardkit_core::{DynamicRecord, Record};
    use proptest::prelude::*;
    use proptest_state_machine::{ReferenceStateMachine, StateMachineTest};

    const TABLE: &str = "orders";

    #[derive(Debug, Clone)]
    enum MergeTransition {
        Insert { id: String, title: String },
        Update { id: String, title: String },
        Delete { id: String },
    }

    impl MergeTransition {
        fn to_event(&self) -> ChangeEvent {
            let mut row = Row::new();
            match self {
                MergeTransition::Insert { id, title } => {
                    row.insert("id".to_string(), Value::from(id.as_str()));
                    row.insert("title".to_string(), Value::from(title.as_str()));
                    ChangeEvent::insert(TABLE, row)
                }
                MergeTransition::Update { id, title } => {
                    row.insert("id".to_string(), Value::from(id.as_str()));
                    row.insert("title".to_string(), Value::from(title.as_str()));
                    ChangeEvent::update(TABLE, row)
                }
                MergeTransition::Delete { id } => {
                    row.insert("id".to_string(), Value::from(id.as_str()));
                    ChangeEvent::delete(TABLE, row)
                }
            }
        }
    }

    /// Reference model: ordered `(id, title)` list
    struct ListModel;

    impl ReferenceStateMachine for ListModel {
        type State = Vec<(String, String)>;
        type Transition = MergeTransition;

        fn init_state() -> BoxedStrategy<Self::State> {
            prop::collection::vec(("[1-3]", "[a-z]{1,4}"), 0..3)
                .prop_map(|pairs| {
                    let mut seen = Vec::<(String, String)>::new();
                    for (id, title) in pairs {
                        if !seen.iter().any(|(existing, _)| *existing == id) {
                            seen.push((id, title));
                        }
                    }
                    seen
                })
                .boxed()
        }

        fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
            let id = "[1-6]";
            let title = "[a-z]{1,4}";
            prop_oneof![
                (id, title).prop_map(|(id, title)| MergeTransition::Insert { id, title }),
                (id, title).prop_map(|(id, title)| MergeTransition::Update { id, title }),
                id.prop_map(|id| MergeTransition::Delete { id }),
            ]
            .boxed()
        }

        fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
            match transition {
                MergeTransition::Insert { id, title } => {
                    match state.iter().position(|(existing, _)| existing == id) {
                        Some(pos) => state[pos].1 = title.clone(),
                        None => state.push((id.clone(), title.clone())),
                    }
                }
                MergeTransition::Update { id, title } => {
                    if let Some(entry) = state.iter_mut().find(|(existing, _)| existing == id) {
                        entry.1 = title.clone();
                    }
                }
                MergeTransition::Delete { id } => state.retain(|(existing, _)| existing != id),
            }
            state
        }
    }

    struct MergerUnderTest {
        merger: ChangeFeedMerger<DynamicRecord>,
        cache: PageCache<DynamicRecord>,
        pending: MutationCoordinator,
    }

    impl StateMachineTest for MergerUnderTest {
        type SystemUnderTest = Self;
        type Reference = ListModel;

        fn init_test(
            ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        ) -> Self::SystemUnderTest {
            let mut cache = PageCache::new();
            cache.replace(
                ref_state
                    .iter()
                    .map(|(id, title)| DynamicRecord::new(id.as_str()).with("title", title.as_str()))
                    .collect(),
            );
            MergerUnderTest {
                merger: ChangeFeedMerger::new(TABLE),
                cache,
                pending: MutationCoordinator::new(),
            }
        }

        fn apply(
            mut state: Self::SystemUnderTest,
            _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
            transition: <Self::Reference as ReferenceStateMachine>::Transition,
        ) -> Self::SystemUnderTest {
            state
                .merger
                .apply(transition.to_event(), &mut state.cache, &mut state.pending);
            state
        }

        fn check_invariants(
            state: &Self::SystemUnderTest,
            ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        ) {
            let actual: Vec<(String, String)> = state
                .cache
                .records()
                .iter()
                .map(|r| {
                    let title = r
                        .field("title")
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    (r.id().to_string(), title)
                })
                .collect();
            assert_eq!(&actual, ref_state);
        }
    }

    proptest_state_machine::prop_state_machine! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            failure_persistence: None,
            .. ProptestConfig::default()
        })]

        #[test]
        fn test_merger_matches_list_model(sequential 1..40 => MergerUnderTest);
    }
}
