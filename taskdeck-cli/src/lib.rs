use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;

pub mod pretty;

// Client-side form validation. Everything here runs before a request is
// attempted; the server enforces its own rules on top.

/// Usernames: 3 to 32 characters from letters, digits, '_', '.' and '-',
/// starting with a letter or digit.
pub fn validate_username(username: &str) -> Result<()> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,31}$").unwrap();
    }
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(anyhow!(
            "invalid username: use 3-32 letters, digits, '_', '.' or '-', starting with a letter or digit"
        ))
    }
}

const PASSWORD_SPECIALS: &str = "@$!%*?&";

/// Registration password policy: at least 8 characters, at least one
/// lowercase letter, one uppercase letter, one digit, and one special
/// character, drawn only from letters, digits, and `@$!%*?&`.
pub fn validate_password(password: &str) -> Result<()> {
    let ok = password.len() >= 8
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c))
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if ok {
        Ok(())
    } else {
        Err(anyhow!(
            "password must be at least 8 characters and contain an uppercase letter, a lowercase letter, a digit, and one of {}",
            PASSWORD_SPECIALS
        ))
    }
}

pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<()> {
    if password == confirmation {
        Ok(())
    } else {
        Err(anyhow!("passwords do not match"))
    }
}

/// Task titles must be at least 3 characters of actual content.
pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().chars().count() >= 3 {
        Ok(())
    } else {
        Err(anyhow!("title must be at least 3 characters"))
    }
}

#[test]
fn test_validate_username() {
    assert!(validate_username("alice").is_ok());
    assert!(validate_username("al").is_err());
    assert!(validate_username("alice.b-2_c").is_ok());
    assert!(validate_username("0cool").is_ok());

    assert!(validate_username("").is_err());
    assert!(validate_username(".alice").is_err());
    assert!(validate_username("alice bob").is_err());
    assert!(validate_username("alice@example.com").is_err());
    assert!(validate_username(&"a".repeat(33)).is_err());
}

#[test]
fn test_validate_password() {
    assert!(validate_password("Str0ng!pw").is_ok());
    assert!(validate_password("Passw0rd!").is_ok());
    assert!(validate_password("aB3$efgh").is_ok());

    assert!(validate_password("").is_err());
    assert!(validate_password("short1A!").is_ok()); // exactly 8
    assert!(validate_password("shrt1A!").is_err()); // 7
    assert!(validate_password("alllower1!").is_err()); // no uppercase
    assert!(validate_password("ALLUPPER1!").is_err()); // no lowercase
    assert!(validate_password("NoDigits!").is_err());
    assert!(validate_password("NoSpecial1").is_err());
    assert!(validate_password("Has Space1!").is_err()); // space not in the charset
}

#[test]
fn test_validate_confirmation() {
    assert!(validate_confirmation("abc", "abc").is_ok());
    assert!(validate_confirmation("abc", "abd").is_err());
    assert!(validate_confirmation("abc", "").is_err());
}

#[test]
fn test_validate_title() {
    assert!(validate_title("Buy milk").is_ok());
    assert!(validate_title("abc").is_ok());
    assert!(validate_title("ab").is_err());
    assert!(validate_title("").is_err());
    assert!(validate_title("  a  ").is_err());
}
