use super::types::State;

/// Sole authority on legal state moves. Both the manager and the worker must
/// consult this before mutating a task; self-transitions are idempotent
/// refreshes and always allowed.
pub fn valid_state_transition(from: &State, to: &State) -> bool {
    use State::*;
    matches!(
        (from, to),
        (Pending, Pending)
            | (Pending, Scheduled)
            | (Scheduled, Scheduled)
            | (Scheduled, Running)
            | (Scheduled, Failed)
            | (Running, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Completed, Completed)
            | (Failed, Scheduled)
            | (Failed, Failed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    const ALL: [State; 5] = [Pending, Scheduled, Running, Completed, Failed];

    #[test]
    fn transition_matrix_is_exact() {
        let legal = [
            (Pending, Pending),
            (Pending, Scheduled),
            (Scheduled, Scheduled),
            (Scheduled, Running),
            (Scheduled, Failed),
            (Running, Running),
            (Running, Completed),
            (Running, Failed),
            (Completed, Completed),
            (Failed, Scheduled),
            (Failed, Failed),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    valid_state_transition(&from, &to),
                    legal.contains(&(from, to)),
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_cannot_restart_silently() {
        assert!(!valid_state_transition(&Completed, &Running));
        assert!(!valid_state_transition(&Completed, &Scheduled));
        assert!(!valid_state_transition(&Failed, &Running));
    }

    #[test]
    fn failed_tasks_can_be_rescheduled() {
        assert!(valid_state_transition(&Failed, &Scheduled));
    }
}
