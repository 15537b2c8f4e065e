use crate::models::{Payload, State};

/// Assistant text for a conversation at rest in `state`.
pub fn render_prompt(state: State, payload: &Payload) -> String {
    match state {
        State::Start => {
            "Hello! I can help you book a flu vaccination appointment.".to_string()
        }
        State::AwaitingIntent => {
            "Would you like to schedule a flu vaccination? Please answer yes or no.".to_string()
        }
        State::AskedName => "Great. What is your full name (first and last)?".to_string(),
        State::GotName => {
            let name = payload.name.as_deref().unwrap_or("there");
            format!("Thanks, {name}. How old are you? Please reply with a number, for example 36.")
        }
        State::GotAge => {
            "Thank you. I have one health question before showing appointments. Reply OK when you're ready."
                .to_string()
        }
        State::AwaitingAllergyResponse => {
            "Do you have a known egg allergy? Please reply yes or no.".to_string()
        }
        State::Eligible | State::OfferedSlots => offer_slots(payload.slots()),
        State::Ineligible => {
            "I'm sorry, based on the information provided you are not eligible for this vaccine. \
             Please talk to your doctor about alternatives."
                .to_string()
        }
        State::AwaitingSelection => match payload.selected_slot.as_deref() {
            Some(slot) => format!("You picked {slot}. Reply OK to review and confirm it."),
            None => "Please pick one of the offered slots.".to_string(),
        },
        State::Confirming => {
            let slot = payload.selected_slot.as_deref().unwrap_or("the selected time");
            format!("You have selected the appointment at {slot}. Please confirm by replying yes or no.")
        }
        State::Completed => {
            let slot = payload.selected_slot.as_deref().unwrap_or("the selected time");
            format!("Your appointment is confirmed at {slot}. Thank you!")
        }
        State::Abort => "No problem, I've stopped here. Have a nice day!".to_string(),
        State::Fallback => {
            "Sorry, I didn't quite understand that. Reply OK and we'll start over.".to_string()
        }
    }
}

fn offer_slots(slots: &[String]) -> String {
    if slots.is_empty() {
        return "I'm sorry, no slots are available right now.".to_string();
    }

    let lines: Vec<String> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| format!("{}) {slot}", i + 1))
        .collect();

    format!(
        "Here are the available appointment slots:\n\n{}\n\nPlease choose a slot by its number (1-{}).",
        lines.join("\n"),
        slots.len()
    )
}
