//! Language configuration for voice calls
//!
//! Maps a language code to the synthesis voice, the speech-recognition
//! locale, and the instruction appended to LLM prompts so replies come back
//! in the caller's language.

/// Per-language voice configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Locale code stored on the session (e.g. "hi-IN")
    pub code: &'static str,
    /// Human name, also used for spoken switch detection
    pub name: &'static str,
    /// Synthesis voice identifier
    pub voice: &'static str,
    /// Speech-recognition locale for gather
    pub gather_language: &'static str,
    /// Appended to LLM prompts
    pub llm_instruction: &'static str,
}

pub const DEFAULT_LANGUAGE: LanguageConfig = LanguageConfig {
    code: "en-US",
    name: "English",
    voice: "Polly.Matthew",
    gather_language: "en-US",
    llm_instruction: "Reply in English.",
};

const LANGUAGES: [LanguageConfig; 6] = [
    DEFAULT_LANGUAGE,
    LanguageConfig {
        code: "hi-IN",
        name: "Hindi",
        voice: "Polly.Aditi",
        gather_language: "hi-IN",
        llm_instruction: "Reply in Hindi using Devanagari script.",
    },
    LanguageConfig {
        code: "es-ES",
        name: "Spanish",
        voice: "Polly.Conchita",
        gather_language: "es-ES",
        llm_instruction: "Reply in Spanish.",
    },
    LanguageConfig {
        code: "fr-FR",
        name: "French",
        voice: "Polly.Celine",
        gather_language: "fr-FR",
        llm_instruction: "Reply in French.",
    },
    LanguageConfig {
        code: "de-DE",
        name: "German",
        voice: "Polly.Marlene",
        gather_language: "de-DE",
        llm_instruction: "Reply in German.",
    },
    LanguageConfig {
        code: "ta-IN",
        name: "Tamil",
        voice: "Polly.Raveena",
        gather_language: "ta-IN",
        llm_instruction: "Reply in Tamil.",
    },
];

/// Look up a language by its code, falling back to English
pub fn by_code(code: &str) -> LanguageConfig {
    LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
        .copied()
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Detect a spoken request to switch languages ("can we speak Hindi?").
/// Returns the requested language when it differs from the current one.
pub fn detect_switch_request(speech: &str, current_code: &str) -> Option<LanguageConfig> {
    let lowered = speech.to_lowercase();
    if !(lowered.contains("speak") || lowered.contains("language") || lowered.contains("talk")) {
        return None;
    }
    LANGUAGES
        .iter()
        .find(|l| {
            lowered.contains(&l.name.to_lowercase())
                && !l.code.eq_ignore_ascii_case(current_code)
        })
        .copied()
}

/// Localized acknowledgement spoken right after a language switch
pub fn switch_acknowledgement(config: &LanguageConfig) -> &'static str {
    match config.code {
        "hi-IN" => "ठीक है, अब हम हिंदी में बात करेंगे।",
        "es-ES" => "De acuerdo, continuemos en español.",
        "fr-FR" => "D'accord, continuons en français.",
        "de-DE" => "In Ordnung, wir sprechen jetzt Deutsch.",
        "ta-IN" => "சரி, இனி தமிழில் பேசுவோம்.",
        _ => "Alright, we will continue in English.",
    }
}

/// Localized farewell for the end of a call
pub fn farewell(config: &LanguageConfig) -> &'static str {
    match config.code {
        "hi-IN" => "आपके समय के लिए धन्यवाद। शुभ दिन!",
        "es-ES" => "Gracias por su tiempo. ¡Que tenga un buen día!",
        "fr-FR" => "Merci pour votre temps. Bonne journée!",
        "de-DE" => "Vielen Dank für Ihre Zeit. Schönen Tag noch!",
        "ta-IN" => "உங்கள் நேரத்திற்கு நன்றி. நல்ல நாள்!",
        _ => "Thank you for your time. Have a great day!",
    }
}
