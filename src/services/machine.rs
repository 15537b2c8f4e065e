//! Conversation state machine for the vaccination booking flow.
//!
//! All transitions live in one immutable table built on first use and shared
//! by every conversation. Applying an operation never fails: an operation that
//! is not wired for the current state is ignored, and a guard that does not
//! hold leaves the conversation untouched.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::models::conversation::MAX_AGE;
use crate::models::{normalize_yes_no, ConversationState, Operation, OperationKind, Payload, State};
use crate::services::slots::SlotProvider;

/// How many slots to request when a user turns out to be eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    pub days: i64,
    pub per_day: i64,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self { days: 3, per_day: 3 }
    }
}

/// What applying one operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A transition fired. `to` is the state at rest, after any chained hop.
    Applied { from: State, to: State },
    /// The operation is wired for this state but no guard accepted its arguments.
    Rejected,
    /// The operation has no transition from the current state.
    Ignored,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

struct Env<'a> {
    slots: &'a dyn SlotProvider,
    policy: SlotPolicy,
}

type Guard = fn(&Payload, &Operation) -> bool;
type Effect = fn(&mut Payload, &Operation, &Env<'_>);

/// Second hop fired in the same step as its parent transition.
struct Hop {
    dest: State,
    effect: Effect,
}

struct Transition {
    dest: State,
    guard: Option<Guard>,
    effect: Option<Effect>,
    then: Option<Hop>,
}

impl Transition {
    fn to(dest: State) -> Self {
        Self {
            dest,
            guard: None,
            effect: None,
            then: None,
        }
    }

    fn when(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    fn doing(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn then(mut self, dest: State, effect: Effect) -> Self {
        self.then = Some(Hop { dest, effect });
        self
    }
}

struct TransitionTable {
    entries: HashMap<(State, OperationKind), Vec<Transition>>,
}

impl TransitionTable {
    fn add(&mut self, source: State, kind: OperationKind, transition: Transition) {
        self.entries.entry((source, kind)).or_default().push(transition);
    }

    fn lookup(&self, source: State, kind: OperationKind) -> Option<&[Transition]> {
        self.entries.get(&(source, kind)).map(Vec::as_slice)
    }
}

static TABLE: Lazy<TransitionTable> = Lazy::new(build_table);

fn build_table() -> TransitionTable {
    use crate::models::OperationKind as Op;

    let mut t = TransitionTable {
        entries: HashMap::new(),
    };

    // intent
    t.add(State::Start, Op::AskIntent, Transition::to(State::AwaitingIntent));
    t.add(State::AwaitingIntent, Op::AffirmIntent, Transition::to(State::AskedName));
    t.add(State::AwaitingIntent, Op::DenyIntent, Transition::to(State::Abort));
    t.add(State::AwaitingIntent, Op::UnclearIntent, Transition::to(State::Fallback));

    // name
    t.add(
        State::AskedName,
        Op::ProvideName,
        Transition::to(State::GotName).when(has_name).doing(set_name),
    );
    t.add(State::AskedName, Op::InvalidName, Transition::to(State::Fallback));

    // age
    t.add(
        State::GotName,
        Op::ProvideAge,
        Transition::to(State::GotAge).when(age_in_range).doing(set_age),
    );
    t.add(State::GotName, Op::InvalidAge, Transition::to(State::Fallback));

    // allergy
    t.add(State::GotAge, Op::AskAllergy, Transition::to(State::AwaitingAllergyResponse));
    t.add(
        State::AwaitingAllergyResponse,
        Op::AnswerAllergy,
        Transition::to(State::Ineligible).when(is_allergic).doing(set_allergy),
    );
    t.add(
        State::AwaitingAllergyResponse,
        Op::AnswerAllergy,
        Transition::to(State::Eligible)
            .when(is_not_allergic)
            .doing(set_allergy)
            .then(State::OfferedSlots, offer_slots),
    );
    t.add(State::AwaitingAllergyResponse, Op::UnclearAllergy, Transition::to(State::Fallback));

    // slot selection
    t.add(
        State::OfferedSlots,
        Op::SelectSlot,
        Transition::to(State::AwaitingSelection).when(is_valid_slot).doing(set_selected_slot),
    );
    t.add(
        State::OfferedSlots,
        Op::SelectSlot,
        Transition::to(State::OfferedSlots).when(is_invalid_slot).doing(set_selected_slot),
    );
    t.add(State::OfferedSlots, Op::InvalidSlot, Transition::to(State::Fallback));

    // confirmation; declining goes back to the slots already offered
    t.add(State::AwaitingSelection, Op::ConfirmSelection, Transition::to(State::Confirming));
    t.add(
        State::Confirming,
        Op::FinishBooking,
        Transition::to(State::Completed).when(booking_accepted),
    );
    t.add(
        State::Confirming,
        Op::FinishBooking,
        Transition::to(State::OfferedSlots).when(booking_declined),
    );

    // interrupts
    for source in State::ALL.into_iter().filter(|s| !s.is_terminal()) {
        t.add(source, Op::EarlyCancel, Transition::to(State::Abort));
    }
    t.add(
        State::Fallback,
        Op::RestartAfterFallback,
        Transition::to(State::Start).doing(reset_payload),
    );

    t
}

// ── Guards ──

fn has_name(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::ProvideName { name } if !name.trim().is_empty())
}

fn age_in_range(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::ProvideAge { age } if (0..=i64::from(MAX_AGE)).contains(age))
}

fn is_allergic(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::AnswerAllergy { allergy } if normalize_yes_no(allergy) == Some(true))
}

fn is_not_allergic(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::AnswerAllergy { allergy } if normalize_yes_no(allergy) == Some(false))
}

fn slot_index(payload: &Payload, op: &Operation) -> Option<usize> {
    let Operation::SelectSlot { choice } = op else {
        return None;
    };
    let index = usize::try_from(*choice).ok()?.checked_sub(1)?;
    (index < payload.slots().len()).then_some(index)
}

fn is_valid_slot(payload: &Payload, op: &Operation) -> bool {
    slot_index(payload, op).is_some()
}

fn is_invalid_slot(payload: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::SelectSlot { .. }) && slot_index(payload, op).is_none()
}

fn booking_accepted(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::FinishBooking { yes: true })
}

fn booking_declined(_: &Payload, op: &Operation) -> bool {
    matches!(op, Operation::FinishBooking { yes: false })
}

// ── Effects ──

fn set_name(payload: &mut Payload, op: &Operation, _: &Env<'_>) {
    if let Operation::ProvideName { name } = op {
        payload.name = Some(name.trim().to_string());
    }
}

fn set_age(payload: &mut Payload, op: &Operation, _: &Env<'_>) {
    if let Operation::ProvideAge { age } = op {
        if let Ok(age) = u8::try_from(*age) {
            payload.age = Some(age);
        }
    }
}

fn set_allergy(payload: &mut Payload, op: &Operation, _: &Env<'_>) {
    if let Operation::AnswerAllergy { allergy } = op {
        payload.allergy = normalize_yes_no(allergy);
    }
}

fn offer_slots(payload: &mut Payload, _: &Operation, env: &Env<'_>) {
    payload.slots = Some(env.slots.get_next_slots(env.policy.days, env.policy.per_day));
}

fn set_selected_slot(payload: &mut Payload, op: &Operation, _: &Env<'_>) {
    payload.selected_slot = slot_index(payload, op).map(|i| payload.slots()[i].clone());
}

fn reset_payload(payload: &mut Payload, _: &Operation, _: &Env<'_>) {
    *payload = Payload::default();
}

/// Operations with at least one transition out of `state`, in declaration order.
pub fn legal_operations(state: State) -> Vec<OperationKind> {
    OperationKind::ALL
        .into_iter()
        .filter(|kind| TABLE.lookup(state, *kind).is_some())
        .collect()
}

pub struct ConversationMachine<'a> {
    slots: &'a dyn SlotProvider,
    policy: SlotPolicy,
}

impl<'a> ConversationMachine<'a> {
    pub fn new(slots: &'a dyn SlotProvider, policy: SlotPolicy) -> Self {
        Self { slots, policy }
    }

    /// Applies one operation to `conv`, including any chained hop, in a single step.
    pub fn apply(&self, conv: &mut ConversationState, op: &Operation) -> Outcome {
        let from = conv.state;
        let Some(candidates) = TABLE.lookup(from, op.kind()) else {
            tracing::debug!(state = %from, operation = %op.kind(), "operation ignored");
            return Outcome::Ignored;
        };

        let Some(transition) = candidates
            .iter()
            .find(|t| t.guard.map_or(true, |guard| guard(&conv.payload, op)))
        else {
            tracing::debug!(state = %from, operation = %op.kind(), "guard rejected operation");
            return Outcome::Rejected;
        };

        let env = Env {
            slots: self.slots,
            policy: self.policy,
        };

        if let Some(effect) = transition.effect {
            effect(&mut conv.payload, op, &env);
        }
        conv.state = transition.dest;

        if let Some(hop) = &transition.then {
            (hop.effect)(&mut conv.payload, op, &env);
            conv.state = hop.dest;
        }

        Outcome::Applied {
            from,
            to: conv.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::slots::FixedClockSlots;
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn clock() -> FixedClockSlots {
        FixedClockSlots::new(
            NaiveDateTime::parse_from_str("2025-05-20 08:15", "%Y-%m-%d %H:%M").unwrap(),
        )
    }

    fn at(state: State) -> ConversationState {
        ConversationState {
            state,
            payload: Payload::default(),
        }
    }

    fn with_slots(slots: &[&str]) -> ConversationState {
        ConversationState {
            state: State::OfferedSlots,
            payload: Payload {
                slots: Some(slots.iter().map(|s| s.to_string()).collect()),
                ..Payload::default()
            },
        }
    }

    fn sample_operation(kind: OperationKind) -> Operation {
        match kind {
            OperationKind::AskIntent => Operation::AskIntent,
            OperationKind::AffirmIntent => Operation::AffirmIntent,
            OperationKind::DenyIntent => Operation::DenyIntent,
            OperationKind::UnclearIntent => Operation::UnclearIntent,
            OperationKind::ProvideName => Operation::ProvideName {
                name: "Alice Smith".to_string(),
            },
            OperationKind::InvalidName => Operation::InvalidName,
            OperationKind::ProvideAge => Operation::ProvideAge { age: 30 },
            OperationKind::InvalidAge => Operation::InvalidAge,
            OperationKind::AskAllergy => Operation::AskAllergy,
            OperationKind::AnswerAllergy => Operation::AnswerAllergy {
                allergy: "no".to_string(),
            },
            OperationKind::UnclearAllergy => Operation::UnclearAllergy,
            OperationKind::SelectSlot => Operation::SelectSlot { choice: 1 },
            OperationKind::InvalidSlot => Operation::InvalidSlot,
            OperationKind::ConfirmSelection => Operation::ConfirmSelection,
            OperationKind::FinishBooking => Operation::FinishBooking { yes: true },
            OperationKind::EarlyCancel => Operation::EarlyCancel,
            OperationKind::RestartAfterFallback => Operation::RestartAfterFallback,
        }
    }

    #[test]
    fn test_happy_path_to_completed() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = ConversationState::new();

        let steps = [
            (Operation::AskIntent, State::AwaitingIntent),
            (Operation::AffirmIntent, State::AskedName),
            (
                Operation::ProvideName {
                    name: "  Alice Smith ".to_string(),
                },
                State::GotName,
            ),
            (Operation::ProvideAge { age: 30 }, State::GotAge),
            (Operation::AskAllergy, State::AwaitingAllergyResponse),
            (
                Operation::AnswerAllergy {
                    allergy: "no".to_string(),
                },
                State::OfferedSlots,
            ),
            (Operation::SelectSlot { choice: 1 }, State::AwaitingSelection),
            (Operation::ConfirmSelection, State::Confirming),
            (Operation::FinishBooking { yes: true }, State::Completed),
        ];

        for (op, expected) in steps {
            let outcome = machine.apply(&mut conv, &op);
            assert!(outcome.is_applied(), "{op:?} was not applied");
            assert_eq!(conv.state, expected);
        }

        let payload = &conv.payload;
        assert_eq!(payload.name.as_deref(), Some("Alice Smith"));
        assert_eq!(payload.age, Some(30));
        assert_eq!(payload.allergy, Some(false));
        assert_eq!(payload.slots().len(), 9);
        assert_eq!(payload.selected_slot.as_deref(), Some(payload.slots()[0].as_str()));
    }

    #[test]
    fn test_unguarded_exits_keep_payload() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let payload = Payload {
            name: Some("Alice Smith".to_string()),
            age: Some(30),
            slots: Some(vec!["2025-05-20T09:00".to_string()]),
            ..Payload::default()
        };

        let cases = [
            (State::AwaitingIntent, Operation::DenyIntent, State::Abort),
            (State::AwaitingIntent, Operation::UnclearIntent, State::Fallback),
            (State::AskedName, Operation::InvalidName, State::Fallback),
            (State::GotName, Operation::InvalidAge, State::Fallback),
            (State::AwaitingAllergyResponse, Operation::UnclearAllergy, State::Fallback),
            (State::OfferedSlots, Operation::InvalidSlot, State::Fallback),
            (State::AwaitingSelection, Operation::ConfirmSelection, State::Confirming),
        ];

        for (source, op, dest) in cases {
            let mut conv = ConversationState {
                state: source,
                payload: payload.clone(),
            };

            let outcome = machine.apply(&mut conv, &op);

            assert_eq!(outcome, Outcome::Applied { from: source, to: dest }, "{op:?}");
            assert_eq!(conv.state, dest);
            assert_eq!(conv.payload, payload, "{op:?} touched the payload");
        }
    }

    #[test]
    fn test_allergic_user_is_ineligible_without_slots() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = at(State::AwaitingAllergyResponse);

        let outcome = machine.apply(
            &mut conv,
            &Operation::AnswerAllergy {
                allergy: "YES".to_string(),
            },
        );

        assert_eq!(
            outcome,
            Outcome::Applied {
                from: State::AwaitingAllergyResponse,
                to: State::Ineligible
            }
        );
        assert_eq!(conv.payload.allergy, Some(true));
        assert_eq!(conv.payload.slots, None);
    }

    #[test]
    fn test_eligible_hops_straight_to_offered_slots() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = at(State::AwaitingAllergyResponse);

        let outcome = machine.apply(
            &mut conv,
            &Operation::AnswerAllergy {
                allergy: "nah".to_string(),
            },
        );

        assert_eq!(
            outcome,
            Outcome::Applied {
                from: State::AwaitingAllergyResponse,
                to: State::OfferedSlots
            }
        );
        assert_eq!(conv.payload.allergy, Some(false));
        assert_eq!(conv.payload.slots().len(), 9);
        assert_eq!(conv.payload.slots()[0], "2025-05-20T09:00");
        assert_eq!(conv.payload.slots()[8], "2025-05-22T14:00");
    }

    #[test]
    fn test_slot_policy_is_used() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy { days: 2, per_day: 2 });
        let mut conv = at(State::AwaitingAllergyResponse);

        machine.apply(
            &mut conv,
            &Operation::AnswerAllergy {
                allergy: "no".to_string(),
            },
        );

        assert_eq!(conv.payload.slots().len(), 4);
    }

    #[test]
    fn test_ambiguous_allergy_answer_is_rejected() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = at(State::AwaitingAllergyResponse);

        let outcome = machine.apply(
            &mut conv,
            &Operation::AnswerAllergy {
                allergy: "maybe".to_string(),
            },
        );

        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(conv, at(State::AwaitingAllergyResponse));

        machine.apply(&mut conv, &Operation::UnclearAllergy);
        assert_eq!(conv.state, State::Fallback);
    }

    #[test]
    fn test_select_second_slot() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = with_slots(&["2025-05-20T09:00", "2025-05-20T11:00", "2025-05-20T14:00"]);

        machine.apply(&mut conv, &Operation::SelectSlot { choice: 2 });

        assert_eq!(conv.state, State::AwaitingSelection);
        assert_eq!(conv.payload.selected_slot.as_deref(), Some("2025-05-20T11:00"));
    }

    #[test]
    fn test_out_of_range_slot_loops_and_clears_selection() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());

        for choice in [0, 4, -1, i64::MAX] {
            let mut conv =
                with_slots(&["2025-05-20T09:00", "2025-05-20T11:00", "2025-05-20T14:00"]);
            conv.payload.selected_slot = Some("2025-05-20T09:00".to_string());

            let outcome = machine.apply(&mut conv, &Operation::SelectSlot { choice });

            assert_eq!(
                outcome,
                Outcome::Applied {
                    from: State::OfferedSlots,
                    to: State::OfferedSlots
                }
            );
            assert_eq!(conv.payload.selected_slot, None);
            assert_eq!(conv.payload.slots().len(), 3);
        }
    }

    #[test]
    fn test_declined_booking_keeps_prior_slots() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = with_slots(&["2030-01-01T09:00", "2030-01-01T11:00"]);

        machine.apply(&mut conv, &Operation::SelectSlot { choice: 2 });
        machine.apply(&mut conv, &Operation::ConfirmSelection);
        let outcome = machine.apply(&mut conv, &Operation::FinishBooking { yes: false });

        assert_eq!(
            outcome,
            Outcome::Applied {
                from: State::Confirming,
                to: State::OfferedSlots
            }
        );
        assert_eq!(
            conv.payload.slots(),
            &["2030-01-01T09:00".to_string(), "2030-01-01T11:00".to_string()]
        );

        machine.apply(&mut conv, &Operation::SelectSlot { choice: 1 });
        assert_eq!(conv.payload.selected_slot.as_deref(), Some("2030-01-01T09:00"));
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = at(State::AskedName);

        let outcome = machine.apply(
            &mut conv,
            &Operation::ProvideName {
                name: "   ".to_string(),
            },
        );

        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(conv, at(State::AskedName));
    }

    #[test]
    fn test_fallback_restart_clears_payload() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut conv = at(State::GotName);
        conv.payload.name = Some("Alice".to_string());

        machine.apply(&mut conv, &Operation::InvalidAge);
        assert_eq!(conv.state, State::Fallback);
        assert_eq!(conv.payload.name.as_deref(), Some("Alice"));

        machine.apply(&mut conv, &Operation::RestartAfterFallback);
        assert_eq!(conv, ConversationState::new());
    }

    #[test]
    fn test_early_cancel_from_every_non_terminal_state() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());

        for state in State::ALL {
            let mut conv = at(state);
            conv.payload.name = Some("Alice".to_string());
            let outcome = machine.apply(&mut conv, &Operation::EarlyCancel);

            if state.is_terminal() {
                assert_eq!(outcome, Outcome::Ignored);
                assert_eq!(conv.state, state);
            } else {
                assert_eq!(conv.state, State::Abort);
            }
            assert_eq!(conv.payload.name.as_deref(), Some("Alice"));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        assert!(legal_operations(State::Completed).is_empty());
        assert!(legal_operations(State::Abort).is_empty());
        assert_eq!(legal_operations(State::Ineligible), vec![OperationKind::EarlyCancel]);
        assert_eq!(
            legal_operations(State::Fallback),
            vec![OperationKind::EarlyCancel, OperationKind::RestartAfterFallback]
        );
    }

    #[test]
    fn test_resume_after_serialization_matches() {
        let slots = clock();
        let machine = ConversationMachine::new(&slots, SlotPolicy::default());
        let mut live = at(State::AwaitingAllergyResponse);
        live.payload.name = Some("Alice Smith".to_string());
        live.payload.age = Some(30);

        let json = serde_json::to_string(&live).unwrap();
        let mut restored: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, live);

        let op = Operation::AnswerAllergy {
            allergy: "no".to_string(),
        };
        assert_eq!(machine.apply(&mut live, &op), machine.apply(&mut restored, &op));
        assert_eq!(live, restored);
    }

    fn arb_state() -> impl Strategy<Value = State> {
        proptest::sample::select(State::ALL.to_vec())
    }

    fn arb_kind() -> impl Strategy<Value = OperationKind> {
        proptest::sample::select(OperationKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_illegal_operations_change_nothing(state in arb_state(), kind in arb_kind()) {
            prop_assume!(!legal_operations(state).contains(&kind));
            let slots = clock();
            let machine = ConversationMachine::new(&slots, SlotPolicy::default());
            let mut conv = at(state);
            conv.payload.name = Some("Alice".to_string());
            let before = conv.clone();

            let outcome = machine.apply(&mut conv, &sample_operation(kind));

            prop_assert_eq!(outcome, Outcome::Ignored);
            prop_assert_eq!(conv, before);
        }

        #[test]
        fn prop_age_guard(age in -500i64..500) {
            let slots = clock();
            let machine = ConversationMachine::new(&slots, SlotPolicy::default());
            let mut conv = at(State::GotName);

            let outcome = machine.apply(&mut conv, &Operation::ProvideAge { age });

            if (0..=120).contains(&age) {
                prop_assert!(outcome.is_applied());
                prop_assert_eq!(conv.state, State::GotAge);
                prop_assert_eq!(conv.payload.age.map(i64::from), Some(age));
            } else {
                prop_assert_eq!(outcome, Outcome::Rejected);
                prop_assert_eq!(conv, at(State::GotName));
            }
        }
    }
}
