use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::models::{ConversationState, Operation, OperationKind, State};
use crate::services::machine::{self, ConversationMachine, Outcome};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("operation {operation} is not permitted in state {state}")]
    NotPermitted {
        state: State,
        operation: OperationKind,
    },
}

static LEGAL: Lazy<HashMap<State, Vec<OperationKind>>> = Lazy::new(|| {
    State::ALL
        .into_iter()
        .map(|state| (state, machine::legal_operations(state)))
        .collect()
});

/// Boundary check in front of the machine: only operations wired for the
/// current state get through.
pub struct IntentDispatcher<'a> {
    machine: ConversationMachine<'a>,
}

impl<'a> IntentDispatcher<'a> {
    pub fn new(machine: ConversationMachine<'a>) -> Self {
        Self { machine }
    }

    pub fn legal_operations(state: State) -> &'static [OperationKind] {
        LEGAL.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_legal(state: State, kind: OperationKind) -> bool {
        Self::legal_operations(state).contains(&kind)
    }

    pub fn dispatch(
        &self,
        conv: &mut ConversationState,
        op: &Operation,
    ) -> Result<Outcome, DispatchError> {
        if !Self::is_legal(conv.state, op.kind()) {
            return Err(DispatchError::NotPermitted {
                state: conv.state,
                operation: op.kind(),
            });
        }
        Ok(self.machine.apply(conv, op))
    }
}
