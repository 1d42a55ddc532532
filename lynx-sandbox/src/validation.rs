use crate::error::ValidationError;

/// Check submitted source before any resource is allocated
pub fn validate_source(source: &str, max_bytes: usize) -> Result<(), ValidationError> {
    if source.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if source.len() > max_bytes {
        return Err(ValidationError::TooLarge {
            size: source.len(),
            max: max_bytes,
        });
    }
    if source.contains('\0') {
        return Err(ValidationError::NullByte);
    }
    if source.chars().any(is_forbidden_control) {
        return Err(ValidationError::ControlCharacter);
    }
    Ok(())
}

/// C0 controls other than tab, LF and CR, plus DEL
fn is_forbidden_control(c: char) -> bool {
    matches!(c, '\x01'..='\x08' | '\x0B' | '\x0C' | '\x0E'..='\x1F' | '\x7F')
}
