//! Property-based tests for the state machine
//!
//! Drives random event sequences through `transition` against a tiny
//! in-memory model of the persisted conversation and checks the invariants
//! hold after every step.

use super::*;
use crate::db::Role;
use proptest::prelude::*;
use std::collections::HashMap;

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Submit(String),
    /// Reply to the n-th user message submitted so far (modulo count)
    Reply(usize, String),
    Close,
}

#[derive(Debug, Default)]
struct Model {
    status: ConvStatus,
    /// (id, role, order, `reply_to`)
    messages: Vec<(String, Role, i64, Option<String>)>,
}

impl Model {
    fn context(&self) -> ConvContext {
        let answered: Vec<&str> = self
            .messages
            .iter()
            .filter_map(|(_, _, _, reply_to)| reply_to.as_deref())
            .collect();
        let unanswered = self
            .messages
            .iter()
            .rev()
            .find(|(id, role, _, _)| *role == Role::User && !answered.contains(&id.as_str()))
            .map(|(id, _, _, _)| id.clone());
        ConvContext {
            conversation_id: "conv".to_string(),
            status: self.status,
            unanswered_message_id: unanswered,
        }
    }

    fn user_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|(_, role, _, _)| *role == Role::User)
            .map(|(id, _, _, _)| id.clone())
            .collect()
    }

    fn apply(&mut self, result: TransitionResult) {
        for effect in result.effects {
            match effect {
                Effect::PersistMessage { role, reply_to, .. } => {
                    let next = self.messages.iter().map(|m| m.2).max().unwrap_or(0) + 1;
                    let id = format!("m{next}");
                    self.messages.push((id, role, next, reply_to));
                }
                Effect::PersistStatus => self.status = result.new_status,
                Effect::WakePollers => {}
            }
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => "[a-z ]{1,12}".prop_map(Step::Submit),
        4 => (0usize..4, "[a-z ]{1,12}").prop_map(|(i, text)| Step::Reply(i, text)),
        1 => Just(Step::Close),
    ]
}

fn to_event(model: &Model, step: &Step) -> Event {
    match step {
        Step::Submit(text) => Event::SubmitMessage {
            content: text.clone(),
        },
        Step::Reply(index, text) => {
            let ids = model.user_ids();
            let user_message_id = if ids.is_empty() {
                "none".to_string()
            } else {
                ids[index % ids.len()].clone()
            };
            Event::ReplyCompleted {
                user_message_id,
                reply: text.clone(),
            }
        }
        Step::Close => Event::Close,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn order_numbers_are_unique_and_increasing(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let mut model = Model::default();
        for step in &steps {
            let event = to_event(&model, step);
            if let Ok(result) = transition(&model.context(), event) {
                model.apply(result);
            }
        }
        let orders: Vec<i64> = model.messages.iter().map(|m| m.2).collect();
        for pair in orders.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        prop_assert_eq!(orders.first().copied().unwrap_or(1), 1);
    }

    #[test]
    fn rejected_events_never_produce_effects(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let mut model = Model::default();
        for step in &steps {
            let before = model.messages.len();
            let status_before = model.status;
            let event = to_event(&model, step);
            match transition(&model.context(), event) {
                Ok(result) => model.apply(result),
                Err(_) => {
                    prop_assert_eq!(model.messages.len(), before);
                    prop_assert_eq!(model.status, status_before);
                }
            }
        }
    }

    #[test]
    fn user_messages_only_created_when_accepting_input(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let mut model = Model::default();
        for step in &steps {
            let status_before = model.status;
            let users_before = model.user_ids().len();
            let event = to_event(&model, step);
            if let Ok(result) = transition(&model.context(), event) {
                model.apply(result);
            }
            if model.user_ids().len() > users_before {
                prop_assert!(status_before.accepts_input());
                prop_assert_eq!(model.status, ConvStatus::Pending);
            }
        }
    }

    #[test]
    fn each_user_message_gets_at_most_one_reply(steps in proptest::collection::vec(arb_step(), 1..60)) {
        let mut model = Model::default();
        for step in &steps {
            let event = to_event(&model, step);
            if let Ok(result) = transition(&model.context(), event) {
                model.apply(result);
            }
        }
        let mut replies: HashMap<String, usize> = HashMap::new();
        for (_, _, _, reply_to) in &model.messages {
            if let Some(id) = reply_to {
                *replies.entry(id.clone()).or_default() += 1;
            }
        }
        prop_assert!(replies.values().all(|count| *count == 1));
    }

    #[test]
    fn closed_is_terminal(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let mut model = Model::default();
        let mut closed_at: Option<usize> = None;
        for step in &steps {
            let event = to_event(&model, step);
            if let Ok(result) = transition(&model.context(), event) {
                model.apply(result);
            }
            if model.status == ConvStatus::Closed && closed_at.is_none() {
                closed_at = Some(model.messages.len());
            }
            if let Some(count) = closed_at {
                prop_assert_eq!(model.status, ConvStatus::Closed);
                prop_assert_eq!(model.messages.len(), count);
            }
        }
    }
}
