use solace_types::models::Language;

/// Follow-up prompt cap per reply.
pub const MAX_SUGGESTIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Anxiety,
    Sadness,
    Sleep,
    Work,
    Relationships,
}

struct Category {
    topic: Topic,
    keywords: &'static [&'static str],
    es: &'static [&'static str],
    en: &'static [&'static str],
}

impl Category {
    fn suggestions(&self, language: Language) -> &'static [&'static str] {
        match language {
            Language::Es => self.es,
            Language::En => self.en,
        }
    }
}

// Scan order is significant: earlier categories fill the list first.
const CATEGORIES: &[Category] = &[
    Category {
        topic: Topic::Anxiety,
        keywords: &[
            "ansios", "ansiedad", "nervios", "preocup", "pánico", "panico", "agobi", "anxious",
            "anxiety", "worried", "panic", "nervous",
        ],
        es: &[
            "Probar un ejercicio de respiración",
            "Hablar de lo que me preocupa",
        ],
        en: &["Try a breathing exercise", "Talk about what worries me"],
    },
    Category {
        topic: Topic::Sadness,
        keywords: &[
            "triste", "tristeza", "deprimid", "soledad", "llorar", "sad", "depressed", "lonely",
        ],
        es: &[
            "Escribir sobre lo que siento",
            "Pensar en alguien con quien conectar",
        ],
        en: &["Write about how I feel", "Think of someone to reach out to"],
    },
    Category {
        topic: Topic::Sleep,
        keywords: &["dormir", "sueño", "insomnio", "cansad", "sleep", "insomnia", "tired"],
        es: &[
            "Consejos para dormir mejor",
            "Crear una rutina para la noche",
        ],
        en: &["Tips for better sleep", "Build a bedtime routine"],
    },
    Category {
        topic: Topic::Work,
        keywords: &["trabajo", "jefe", "oficina", "laboral", "work", "job", "boss"],
        es: &[
            "Manejar el estrés laboral",
            "Poner límites en el trabajo",
        ],
        en: &["Handle stress at work", "Set boundaries at work"],
    },
    Category {
        topic: Topic::Relationships,
        keywords: &[
            "pareja", "novio", "novia", "familia", "amig", "relación", "relacion", "partner",
            "family", "friend", "relationship",
        ],
        es: &[
            "Mejorar la comunicación",
            "Expresar lo que necesito",
        ],
        en: &["Communicate better", "Say what I need"],
    },
];

const GENERIC_ES: &[&str] = &[
    "Contar cómo me siento hoy",
    "Probar un ejercicio de relajación",
    "Hablar de algo que me preocupa",
    "Registrar mi estado de ánimo",
];

const GENERIC_EN: &[&str] = &[
    "Share how I feel today",
    "Try a relaxation exercise",
    "Talk about something on my mind",
    "Log my mood",
];

fn generic(language: Language) -> &'static [&'static str] {
    match language {
        Language::Es => GENERIC_ES,
        Language::En => GENERIC_EN,
    }
}

/// Suggestions offered for one topic.
pub fn topic_suggestions(topic: Topic, language: Language) -> &'static [&'static str] {
    CATEGORIES
        .iter()
        .find(|c| c.topic == topic)
        .map_or_else(|| generic(language), |c| c.suggestions(language))
}

/// Short follow-up prompts derived from keywords in the user's message,
/// worded in the session language. Deterministic: categories are scanned
/// in a fixed order and the list is capped at `MAX_SUGGESTIONS`.
pub fn suggest(message: &str, language: Language) -> Vec<String> {
    let lower = message.to_lowercase();

    let matched: Vec<String> = CATEGORIES
        .iter()
        .filter(|c| c.keywords.iter().any(|k| lower.contains(k)))
        .flat_map(|c| c.suggestions(language).iter())
        .take(MAX_SUGGESTIONS)
        .map(|s| s.to_string())
        .collect();

    if matched.is_empty() {
        generic(language).iter().map(|s| s.to_string()).collect()
    } else {
        matched
    }
}
