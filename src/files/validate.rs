//! Pre-upload file checks: emptiness, size limit, MIME allow-list and
//! category filter. Pure pass/fail, no side effects.

use serde::{Deserialize, Serialize};

use super::mime::{category_of, essence, resolve_content_type, MimeCategory, OCTET_STREAM};
use super::FileDescriptor;
use crate::s3::ValidationError;

/// Per-call validation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidationOptions {
    /// Overrides the client's `max_file_size` when set
    #[serde(default)]
    pub max_size: Option<u64>,

    /// Check the MIME type against the allow-list
    #[serde(default = "default_validate_type")]
    pub validate_type: bool,

    /// Restrict to these categories when set
    #[serde(default)]
    pub allowed_categories: Option<Vec<MimeCategory>>,
}

fn default_validate_type() -> bool {
    true
}

impl Default for FileValidationOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            validate_type: default_validate_type(),
            allowed_categories: None,
        }
    }
}

impl FileValidationOptions {
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_validate_type(mut self, validate_type: bool) -> Self {
        self.validate_type = validate_type;
        self
    }

    pub fn with_allowed_categories(mut self, categories: Vec<MimeCategory>) -> Self {
        self.allowed_categories = Some(categories);
        self
    }
}

/// Content type the file will be stored with: the declared one when present,
/// otherwise inferred from the filename.
pub fn effective_content_type(file: &FileDescriptor) -> String {
    match file.content_type.as_deref().map(str::trim) {
        Some(declared) if !declared.is_empty() => declared.to_string(),
        _ => resolve_content_type(&file.filename).to_string(),
    }
}

/// Validate `file` and return its effective content type.
///
/// `default_max_size` and `allowed_types` come from the client
/// configuration.
pub fn validate_file(
    file: &FileDescriptor,
    options: &FileValidationOptions,
    default_max_size: u64,
    allowed_types: &[String],
) -> Result<String, ValidationError> {
    if file.filename.trim().is_empty() {
        return Err(ValidationError::MissingFilename);
    }
    if file.content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    let size = file.size();
    let max = options.max_size.unwrap_or(default_max_size);
    if size > max {
        return Err(ValidationError::TooLarge { size, max });
    }

    let content_type = effective_content_type(file);
    if !options.validate_type {
        return Ok(content_type);
    }

    let mime = essence(&content_type);
    let allowed = mime == OCTET_STREAM
        || allowed_types.iter().any(|allowed| essence(allowed) == mime);
    if !allowed {
        return Err(ValidationError::DisallowedType { mime });
    }

    if let Some(categories) = &options.allowed_categories {
        let category = category_of(&mime);
        if !categories.contains(&category) {
            return Err(ValidationError::DisallowedCategory { mime, category });
        }
    }

    Ok(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::mime::known_mime_types;

    const MAX: u64 = 16;

    fn check(file: &FileDescriptor, options: &FileValidationOptions) -> Result<String, ValidationError> {
        validate_file(file, options, MAX, &known_mime_types())
    }

    #[test]
    fn test_rejects_empty_content() {
        let file = FileDescriptor::new(Vec::new(), "a.txt");
        assert_eq!(check(&file, &Default::default()), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn test_rejects_missing_filename() {
        let file = FileDescriptor::new("data", "  ");
        assert_eq!(check(&file, &Default::default()), Err(ValidationError::MissingFilename));
    }

    #[test]
    fn test_size_boundary() {
        let exact = FileDescriptor::new(vec![b'x'; MAX as usize], "a.txt");
        assert_eq!(check(&exact, &Default::default()), Ok("text/plain".to_string()));

        let over = FileDescriptor::new(vec![b'x'; MAX as usize + 1], "a.txt");
        assert_eq!(
            check(&over, &Default::default()),
            Err(ValidationError::TooLarge { size: MAX + 1, max: MAX })
        );
    }

    #[test]
    fn test_option_max_size_overrides_default() {
        let file = FileDescriptor::new(vec![b'x'; 8], "a.txt");
        let options = FileValidationOptions::default().with_max_size(4);
        assert_eq!(
            check(&file, &options),
            Err(ValidationError::TooLarge { size: 8, max: 4 })
        );

        let big = FileDescriptor::new(vec![b'x'; 32], "a.txt");
        let options = FileValidationOptions::default().with_max_size(64);
        assert!(check(&big, &options).is_ok());
    }

    #[test]
    fn test_unregistered_declared_type() {
        let file = FileDescriptor::new("data", "thing.weird").with_content_type("application/x-weird");
        assert_eq!(
            check(&file, &Default::default()),
            Err(ValidationError::DisallowedType {
                mime: "application/x-weird".to_string()
            })
        );

        let options = FileValidationOptions::default().with_validate_type(false);
        assert_eq!(check(&file, &options), Ok("application/x-weird".to_string()));
    }

    #[test]
    fn test_unknown_extension_falls_back_to_octet_stream() {
        let file = FileDescriptor::new("data", "thing.weird");
        assert_eq!(check(&file, &Default::default()), Ok(OCTET_STREAM.to_string()));
    }

    #[test]
    fn test_declared_type_with_parameters() {
        let file = FileDescriptor::new("data", "a.bin").with_content_type("text/plain; charset=utf-8");
        assert_eq!(
            check(&file, &Default::default()),
            Ok("text/plain; charset=utf-8".to_string())
        );
    }

    #[test]
    fn test_allow_list_from_config() {
        let file = FileDescriptor::new("data", "a.png");
        let only_pdf = vec!["application/pdf".to_string()];
        assert!(matches!(
            validate_file(&file, &Default::default(), MAX, &only_pdf),
            Err(ValidationError::DisallowedType { .. })
        ));
    }

    #[test]
    fn test_category_filter() {
        let options =
            FileValidationOptions::default().with_allowed_categories(vec![MimeCategory::Image]);

        let png = FileDescriptor::new("data", "a.png");
        assert_eq!(check(&png, &options), Ok("image/png".to_string()));

        let pdf = FileDescriptor::new("data", "a.pdf");
        assert_eq!(
            check(&pdf, &options),
            Err(ValidationError::DisallowedCategory {
                mime: "application/pdf".to_string(),
                category: MimeCategory::Document,
            })
        );

        let unknown = FileDescriptor::new("data", "a.weird");
        assert!(matches!(
            check(&unknown, &options),
            Err(ValidationError::DisallowedCategory { category: MimeCategory::Binary, .. })
        ));
    }
}
