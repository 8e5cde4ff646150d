use crate::source::SourceDescriptor;

/// One step of an ingestion. Plans are fixed, ordered lists of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateRequest,
    ResolveSource,
    Extract,
    StripBasedir,
    CollectTextFiles,
    CheckEncoding,
    DetectBag,
    ValidateBag,
    DetectCompendium,
    ResolveIdentity,
    MovePayload,
    ExtractMetadata,
    LoadMetadata,
    BrokerMetadata,
    Save,
}

/// Direct uploads and Zenodo records are extracted as they are.
pub const UPLOAD_PLAN: &[Stage] = &[
    Stage::ValidateRequest,
    Stage::ResolveSource,
    Stage::Extract,
    Stage::CollectTextFiles,
    Stage::CheckEncoding,
    Stage::DetectBag,
    Stage::ValidateBag,
    Stage::DetectCompendium,
    Stage::ResolveIdentity,
    Stage::MovePayload,
    Stage::ExtractMetadata,
    Stage::LoadMetadata,
    Stage::BrokerMetadata,
    Stage::Save,
];

/// Share downloads wrap the folder in one directory, stripped after
/// extraction.
pub const SHARE_PLAN: &[Stage] = &[
    Stage::ValidateRequest,
    Stage::ResolveSource,
    Stage::Extract,
    Stage::StripBasedir,
    Stage::CollectTextFiles,
    Stage::CheckEncoding,
    Stage::DetectBag,
    Stage::ValidateBag,
    Stage::DetectCompendium,
    Stage::ResolveIdentity,
    Stage::MovePayload,
    Stage::ExtractMetadata,
    Stage::LoadMetadata,
    Stage::BrokerMetadata,
    Stage::Save,
];

impl Stage {
    pub fn plan_for(source: &SourceDescriptor) -> &'static [Stage] {
        match source {
            SourceDescriptor::Share { .. } => SHARE_PLAN,
            SourceDescriptor::Upload { .. } | SourceDescriptor::Zenodo { .. } => UPLOAD_PLAN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::ValidateRequest => "validate_request",
            Stage::ResolveSource => "resolve_source",
            Stage::Extract => "extract",
            Stage::StripBasedir => "strip_basedir",
            Stage::CollectTextFiles => "collect_text_files",
            Stage::CheckEncoding => "check_encoding",
            Stage::DetectBag => "detect_bag",
            Stage::ValidateBag => "validate_bag",
            Stage::DetectCompendium => "detect_compendium",
            Stage::ResolveIdentity => "resolve_identity",
            Stage::MovePayload => "move_payload",
            Stage::ExtractMetadata => "extract_metadata",
            Stage::LoadMetadata => "load_metadata",
            Stage::BrokerMetadata => "broker_metadata",
            Stage::Save => "save",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn position(plan: &[Stage], stage: Stage) -> usize {
        plan.iter().position(|s| *s == stage).unwrap()
    }

    #[test]
    fn test_plan_for_source() {
        let upload = SourceDescriptor::Upload {
            path: PathBuf::from("a.zip"),
            mime: None,
        };
        let share = SourceDescriptor::Share {
            url: "https://uni-muenster.sciebo.de/s/abc".to_string(),
            path: None,
        };
        assert!(!Stage::plan_for(&upload).contains(&Stage::StripBasedir));
        assert!(Stage::plan_for(&share).contains(&Stage::StripBasedir));
    }

    #[test]
    fn test_plans_keep_dependency_order() {
        for plan in [UPLOAD_PLAN, SHARE_PLAN] {
            assert_eq!(plan[0], Stage::ValidateRequest);
            assert_eq!(*plan.last().unwrap(), Stage::Save);
            assert!(position(plan, Stage::CheckEncoding) < position(plan, Stage::DetectBag));
            assert!(position(plan, Stage::DetectBag) < position(plan, Stage::DetectCompendium));
            assert!(position(plan, Stage::ResolveIdentity) < position(plan, Stage::MovePayload));
            assert!(position(plan, Stage::MovePayload) < position(plan, Stage::ExtractMetadata));
            assert!(position(plan, Stage::LoadMetadata) < position(plan, Stage::BrokerMetadata));
        }
    }

    #[test]
    fn test_stage_names_unique() {
        let mut names: Vec<&str> = SHARE_PLAN.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SHARE_PLAN.len());
    }
}
