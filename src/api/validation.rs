use super::ApiError;
use crate::services::validation::is_valid_email;

const MAX_ID_LEN: usize = 64;
const MAX_RECIPIENTS: usize = 100;

/// Path identifiers are UUIDs; anything else is rejected before it reaches the database.
pub fn validate_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, ApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if !valid {
        return Err(ApiError::validation(format!("Invalid {kind} ID")));
    }
    Ok(id)
}

pub fn validate_recipients(to: &[String], cc: &[String], bcc: &[String]) -> Result<(), ApiError> {
    if to.is_empty() {
        return Err(ApiError::validation("At least one recipient is required"));
    }

    let total = to.len() + cc.len() + bcc.len();
    if total > MAX_RECIPIENTS {
        return Err(ApiError::validation(format!(
            "Too many recipients: {total}. At most {MAX_RECIPIENTS} are allowed"
        )));
    }

    if let Some(bad) = to
        .iter()
        .chain(cc)
        .chain(bcc)
        .find(|address| !is_valid_email(address.trim()))
    {
        return Err(ApiError::validation(format!("Invalid recipient address: {bad}")));
    }

    Ok(())
}
