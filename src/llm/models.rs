/// Models used by the pipeline stages.
///
/// Detection runs on the cheaper mini tier; supervision and fixing get the
/// full model since a wrong verdict there writes to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// First-pass bug detection
    Detector,
    /// Independent review of detector output
    Supervisor,
    /// Fix generation (full-file rewrite)
    Fixer,
}

const MODEL_MAX_TOKENS: u32 = 16384;

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Detector => "openai/gpt-4.1-mini",
            Model::Supervisor => "openai/gpt-4.1",
            Model::Fixer => "openai/gpt-4.1",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert!(Model::Detector.id().contains("mini"));
        assert!(!Model::Supervisor.id().contains("mini"));
        assert!(!Model::Fixer.id().contains("mini"));
    }

    #[test]
    fn test_model_max_tokens() {
        assert_eq!(Model::Detector.max_tokens(), MODEL_MAX_TOKENS);
        assert_eq!(Model::Fixer.max_tokens(), MODEL_MAX_TOKENS);
    }
}
