//! Feature groups, windows, and bind groups.

use std::collections::HashSet;

use ranker_core::{KeySet, Window};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::registry::FeatureRegistry;

/// User profile attributes projected by `base_features`.
pub const USER_FEATURES: &[&str] = &[
    "user_is_mom",
    "user_is_pregnant",
    "user_is_trying",
    "user_country_code",
    "days_since_user_account_creation",
    "user_pregnancy_current_day",
    "user_pregnancy_current_week",
    "user_pregnancy_current_month",
    "user_pregnancy_current_trimester",
    "platform",
    "user_followings_count",
    "user_posts_count",
    "user_received_comments_count",
    "user_pictures_count",
    "user_likes_count",
    "user_children_count",
    "user_department",
];

/// Post content attributes projected by `base_features`.
pub const POST_FEATURES: &[&str] = &[
    "post_age_in_minutes",
    "author_children_count",
    "post_comments_count",
    "post_likes_count",
    "survey_answers_count",
    "has_picture",
    "has_text",
    "has_video",
    "author_department",
    "author_age",
    "author_amenorrhea_week",
];

/// A feature group: extractors whose tables merge on one declared key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FeatureGroup {
    #[validate(length(min = 1))]
    pub name: String,
    pub key: KeySet,
    /// Registry extractors feeding this group
    #[validate(length(min = 1))]
    pub extractors: Vec<String>,
}

/// One backward as-of bind: which entity it keys on and what it attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BindGroup {
    #[validate(length(min = 1))]
    pub name: String,
    /// Entity key of the join (time is always the as-of axis)
    pub by: KeySet,
    /// Explicit wide-table columns
    #[serde(default)]
    pub columns: Vec<String>,
    /// Feature groups whose every column is attached
    #[serde(default)]
    pub include_groups: Vec<String>,
}

/// Feature engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_features"))]
pub struct FeaturesConfig {
    #[serde(default = "Window::defaults")]
    #[validate(length(min = 1))]
    pub windows: Vec<Window>,
    #[serde(default = "default_user_columns")]
    pub user_columns: Vec<String>,
    #[serde(default = "default_post_columns")]
    pub post_columns: Vec<String>,
    /// Merge order of the wide table; the first group seeds it
    #[serde(default = "default_groups")]
    #[validate(length(min = 1), nested)]
    pub groups: Vec<FeatureGroup>,
    /// Chained as-of binds, applied in order
    #[serde(default = "default_bind_groups")]
    #[validate(nested)]
    pub bind_groups: Vec<BindGroup>,
}

fn default_user_columns() -> Vec<String> {
    USER_FEATURES.iter().map(|s| s.to_string()).collect()
}

fn default_post_columns() -> Vec<String> {
    POST_FEATURES.iter().map(|s| s.to_string()).collect()
}

fn default_groups() -> Vec<FeatureGroup> {
    let group = |name: &str, key: KeySet| FeatureGroup {
        name: name.to_string(),
        key,
        extractors: vec![name.to_string()],
    };
    vec![
        group("base_features", KeySet::UserPost),
        group("extra_features", KeySet::UserPost),
        group("post_popularity", KeySet::Post),
        group("user_post_popularity", KeySet::UserPost),
    ]
}

fn default_bind_groups() -> Vec<BindGroup> {
    vec![
        BindGroup {
            name: "user".to_string(),
            by: KeySet::User,
            columns: default_user_columns(),
            include_groups: Vec::new(),
        },
        BindGroup {
            name: "post".to_string(),
            by: KeySet::Post,
            columns: default_post_columns(),
            include_groups: vec!["post_popularity".to_string()],
        },
        BindGroup {
            name: "user_post".to_string(),
            by: KeySet::UserPost,
            columns: Vec::new(),
            include_groups: vec![
                "extra_features".to_string(),
                "user_post_popularity".to_string(),
            ],
        },
    ]
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_features(config: &FeaturesConfig) -> Result<(), ValidationError> {
    let registry = FeatureRegistry::standard();

    let mut group_names = HashSet::new();
    for group in &config.groups {
        if !group_names.insert(group.name.as_str()) {
            return Err(invalid("duplicate_group", format!("feature group '{}' declared twice", group.name)));
        }
        for extractor in &group.extractors {
            match registry.get(extractor) {
                None => {
                    return Err(invalid(
                        "unknown_extractor",
                        format!("group '{}' names unknown extractor '{}'", group.name, extractor),
                    ))
                }
                Some(e) if e.key != group.key => {
                    return Err(invalid(
                        "key_mismatch",
                        format!(
                            "group '{}' declares key {:?} but extractor '{}' produces {:?}",
                            group.name, group.key, extractor, e.key
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    for bind in &config.bind_groups {
        for included in &bind.include_groups {
            if !group_names.contains(included.as_str()) {
                return Err(invalid(
                    "unknown_group",
                    format!("bind group '{}' includes unknown feature group '{}'", bind.name, included),
                ));
            }
        }
    }

    let mut labels = HashSet::new();
    for window in &config.windows {
        if !labels.insert(window.label()) {
            return Err(invalid("duplicate_window", format!("window '{}' listed twice", window)));
        }
    }

    Ok(())
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            windows: Window::defaults(),
            user_columns: default_user_columns(),
            post_columns: default_post_columns(),
            groups: default_groups(),
            bind_groups: default_bind_groups(),
        }
    }
}

impl FeaturesConfig {
    pub fn group(&self, name: &str) -> Option<&FeatureGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }
}
