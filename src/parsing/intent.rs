//! Intent extraction: plain chat, selfie request, or photo request.

use crate::config::{TriggerSet, Triggers};
use crate::parsing::triggers::{clean_command, strip_prefix_ignore_case};

/// Whether an image kind was requested, and with what detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImagePrompt {
    #[default]
    NotRequested,
    /// Requested with no descriptive detail, e.g. just "take a selfie".
    Bare,
    /// Requested; the residual text after the trigger. May be empty for photos.
    Detailed(String),
}

impl ImagePrompt {
    pub fn is_requested(&self) -> bool {
        !matches!(self, Self::NotRequested)
    }

    /// The residual prompt text; empty when there is none.
    pub fn detail(&self) -> &str {
        match self {
            Self::Detailed(detail) => detail,
            Self::NotRequested | Self::Bare => "",
        }
    }
}

/// The image request a turn carries. Selfie wins if both kinds matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRequest<'a> {
    Selfie { detail: Option<&'a str> },
    Photo { detail: &'a str },
}

/// Classified intent of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intent {
    pub selfie: ImagePrompt,
    pub photo: ImagePrompt,
}

impl Intent {
    pub fn extract(command: &str, triggers: &Triggers) -> Self {
        Self {
            selfie: extract_selfie(command, &triggers.selfie),
            photo: extract_photo(command, &triggers.photo),
        }
    }

    pub fn has_selfie_prompt(&self) -> bool {
        self.selfie.is_requested()
    }

    pub fn has_photo_prompt(&self) -> bool {
        self.photo.is_requested()
    }

    pub fn has_image_prompt(&self) -> bool {
        self.has_selfie_prompt() || self.has_photo_prompt()
    }

    pub fn image_request(&self) -> Option<ImageRequest<'_>> {
        match (&self.selfie, &self.photo) {
            (ImagePrompt::Bare, _) => Some(ImageRequest::Selfie { detail: None }),
            (ImagePrompt::Detailed(detail), _) => Some(ImageRequest::Selfie {
                detail: Some(detail.as_str()),
            }),
            (ImagePrompt::NotRequested, ImagePrompt::NotRequested) => None,
            (ImagePrompt::NotRequested, photo) => Some(ImageRequest::Photo {
                detail: photo.detail(),
            }),
        }
    }
}

/// First selfie trigger the command starts with wins.
///
/// Only a command that is exactly the trigger, case included, yields
/// [`ImagePrompt::Bare`]. Any other match with nothing left after the
/// trigger is not a request.
pub fn extract_selfie(command: &str, triggers: &TriggerSet) -> ImagePrompt {
    match residual(command, triggers) {
        None => ImagePrompt::NotRequested,
        Some((trigger, _)) if command == trigger => ImagePrompt::Bare,
        Some((_, detail)) if detail.is_empty() => ImagePrompt::NotRequested,
        Some((_, detail)) => ImagePrompt::Detailed(detail),
    }
}

/// First photo trigger the command starts with wins.
///
/// Unlike selfies there is no bare form: an exact match yields
/// `Detailed("")`, so callers must use [`ImagePrompt::is_requested`].
pub fn extract_photo(command: &str, triggers: &TriggerSet) -> ImagePrompt {
    residual(command, triggers).map_or(ImagePrompt::NotRequested, |(_, detail)| {
        ImagePrompt::Detailed(detail)
    })
}

/// The matching trigger and the cleaned text after it.
fn residual<'t>(command: &str, triggers: &'t TriggerSet) -> Option<(&'t str, String)> {
    triggers.iter().find_map(|trigger| {
        strip_prefix_ignore_case(command, trigger).map(|rest| (trigger, clean_command(rest)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> TriggerSet {
        TriggerSet::new(items.iter().map(|s| s.to_string()))
    }

    fn triggers() -> Triggers {
        Triggers {
            selfie: set(&["take a selfie", "selfie"]),
            photo: set(&["send a photo of", "send a photo"]),
            ..Triggers::default()
        }
    }

    #[test]
    fn plain_message_has_no_image() {
        let intent = Intent::extract("how are you?", &triggers());
        assert!(!intent.has_image_prompt());
        assert_eq!(intent.image_request(), None);
    }

    #[test]
    fn exact_selfie_trigger_is_bare() {
        let intent = Intent::extract("take a selfie", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::Bare);
        assert!(intent.has_selfie_prompt());
        assert!(intent.has_image_prompt());
        assert_eq!(intent.image_request(), Some(ImageRequest::Selfie { detail: None }));
    }

    #[test]
    fn selfie_trigger_with_other_case_and_no_detail_is_not_a_request() {
        let intent = Intent::extract("Take A Selfie", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::NotRequested);
        assert!(!intent.has_selfie_prompt());
        assert_eq!(intent.image_request(), None);
    }

    #[test]
    fn selfie_trigger_followed_by_separators_only_is_not_a_request() {
        let intent = Intent::extract("take a selfie, ,", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::NotRequested);
        assert!(!intent.has_image_prompt());
    }

    #[test]
    fn selfie_trigger_match_is_case_insensitive_with_detail() {
        let intent = Intent::extract("TAKE A SELFIE at the park", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::Detailed("at the park".into()));
    }

    #[test]
    fn selfie_with_detail() {
        let intent = Intent::extract("take a selfie, at the beach", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::Detailed("at the beach".into()));
        assert_eq!(
            intent.image_request(),
            Some(ImageRequest::Selfie {
                detail: Some("at the beach")
            })
        );
    }

    #[test]
    fn longest_selfie_trigger_wins() {
        let intent = Intent::extract("selfie time", &triggers());
        assert_eq!(intent.selfie, ImagePrompt::Detailed("time".into()));
    }

    #[test]
    fn exact_photo_trigger_is_requested_with_empty_detail() {
        // Photos have no bare form: the detail is empty yet the request stands.
        let intent = Intent::extract("send a photo", &triggers());
        assert_eq!(intent.photo, ImagePrompt::Detailed(String::new()));
        assert_eq!(intent.photo.detail(), "");
        assert!(intent.has_photo_prompt());
        assert_eq!(intent.image_request(), Some(ImageRequest::Photo { detail: "" }));
    }

    #[test]
    fn photo_with_detail() {
        let intent = Intent::extract("send a photo of a cat", &triggers());
        assert_eq!(intent.photo.detail(), "a cat");
    }

    #[test]
    fn selfie_takes_priority_over_photo() {
        let triggers = Triggers {
            selfie: set(&["send a"]),
            photo: set(&["send a photo of"]),
            ..Triggers::default()
        };
        let intent = Intent::extract("send a photo of a dog", &triggers);
        assert!(intent.has_selfie_prompt() && intent.has_photo_prompt());
        assert!(matches!(intent.image_request(), Some(ImageRequest::Selfie { .. })));
    }

    #[test]
    fn empty_trigger_sets_never_match() {
        let intent = Intent::extract("take a selfie", &Triggers::default());
        assert_eq!(intent, Intent::default());
    }
}
