use solace_types::models::{CrisisResource, Language, ResourceBundle, ResourceContact};

use crate::crisis::CrisisSeverity;

fn phone(name: &str, number: &str, description: &str) -> CrisisResource {
    CrisisResource {
        name: name.to_string(),
        contact: ResourceContact::Phone(number.to_string()),
        description: description.to_string(),
    }
}

fn link(name: &str, url: &str, description: &str) -> CrisisResource {
    CrisisResource {
        name: name.to_string(),
        contact: ResourceContact::Url(url.to_string()),
        description: description.to_string(),
    }
}

/// Urgency and priority labels for a detected severity.
fn urgency(severity: CrisisSeverity) -> (&'static str, &'static str) {
    match severity {
        CrisisSeverity::High => ("high", "immediate"),
        CrisisSeverity::Medium => ("medium", "urgent"),
        CrisisSeverity::Low | CrisisSeverity::None => ("low", "soon"),
    }
}

/// Crisis-support resources for a language. Never fails: every language has
/// a bundle.
pub fn resources_for(language: Language, severity: CrisisSeverity) -> ResourceBundle {
    let (urgency, priority) = urgency(severity);
    match language {
        Language::Es => ResourceBundle {
            language,
            message: "Me preocupa lo que me cuentas y quiero que estés a salvo. No estás solo/a: \
                      hay personas preparadas para ayudarte ahora mismo. Por favor, contacta con \
                      alguno de estos recursos."
                .to_string(),
            resources: vec![
                phone(
                    "Línea 024",
                    "024",
                    "Atención a la conducta suicida en España. Gratuita, 24 horas.",
                ),
                phone(
                    "Línea de la Vida",
                    "800 911 2000",
                    "Apoyo emocional y en crisis en México. Gratuita, 24 horas.",
                ),
                phone(
                    "Emergencias",
                    "112",
                    "Si estás en peligro inmediato, llama a los servicios de emergencia.",
                ),
                link(
                    "Teléfono de la Esperanza",
                    "https://telefonodelaesperanza.org",
                    "Orientación y acompañamiento emocional por teléfono y chat.",
                ),
            ],
            urgency: urgency.to_string(),
            priority: priority.to_string(),
        },
        Language::En => ResourceBundle {
            language,
            message: "I'm worried about what you've shared and I want you to be safe. You are \
                      not alone: people are ready to help you right now. Please reach out to \
                      one of these resources."
                .to_string(),
            resources: vec![
                phone(
                    "988 Suicide & Crisis Lifeline",
                    "988",
                    "Free, confidential support in the US, 24/7, by call or text.",
                ),
                phone(
                    "Crisis Text Line",
                    "741741",
                    "Text HOME to reach a trained crisis counselor.",
                ),
                phone(
                    "Emergency services",
                    "911",
                    "If you are in immediate danger, call emergency services.",
                ),
                link(
                    "Find A Helpline",
                    "https://findahelpline.com",
                    "Directory of free crisis lines in other countries.",
                ),
            ],
            urgency: urgency.to_string(),
            priority: priority.to_string(),
        },
    }
}
