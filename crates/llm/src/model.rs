#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-16k";

const KNOWN_MODEL_IDS: &[(&str, Option<&str>)] = &[
    ("gpt-4-1106-preview", Some("GPT-4 Turbo preview")),
    ("gpt-4-vision-preview", Some("GPT-4 with image input")),
    ("gpt-4", None),
    ("gpt-4-0314", None),
    ("gpt-4-0613", None),
    ("gpt-4-32k", Some("32k context window")),
    ("gpt-4-32k-0314", None),
    ("gpt-4-32k-0613", None),
    ("gpt-3.5-turbo-1106", None),
    ("gpt-3.5-turbo", None),
    ("gpt-3.5-turbo-16k", Some("Default chat model")),
    ("gpt-3.5-turbo-0301", None),
    ("gpt-3.5-turbo-0613", None),
    ("gpt-3.5-turbo-16k-0613", None),
];

/// Chat models the OpenAI adapter is known to serve.
pub fn known_models() -> Vec<Model> {
    KNOWN_MODEL_IDS
        .iter()
        .map(|(id, description)| {
            let model = Model::from_id(*id);
            match description {
                Some(description) => model.with_description(*description),
                None => model,
            }
        })
        .collect()
}

/// Model ids are opaque to this crate; this only answers whether the id is in the catalog.
pub fn is_known_model(model_id: &str) -> bool {
    KNOWN_MODEL_IDS.iter().any(|(id, _)| *id == model_id.trim())
}
