use super::*;

#[test]
fn unknown_identity_and_bad_secret_are_invalid_credentials() {
    assert_eq!(AuthError::from_provider_kind("UserNotFoundException"), AuthError::InvalidCredentials);
    assert_eq!(AuthError::from_provider_kind("NotAuthorizedException"), AuthError::InvalidCredentials);
}

#[test]
fn namespaced_kind_is_stripped() {
    assert_eq!(
        AuthError::from_provider_kind("com.amazonaws.cognito.identity.idp.model#CodeMismatchException"),
        AuthError::InvalidCode
    );
}

#[test]
fn every_documented_kind_maps() {
    let cases = [
        ("UserNotConfirmedException", AuthError::VerificationRequired),
        ("PasswordResetRequiredException", AuthError::ResetRequired),
        ("TooManyRequestsException", AuthError::RateLimited),
        ("LimitExceededException", AuthError::RateLimited),
        ("TooManyFailedAttemptsException", AuthError::RateLimited),
        ("ExpiredCodeException", AuthError::ExpiredCode),
        ("InvalidPasswordException", AuthError::WeakPassword),
    ];
    for (kind, expected) in cases {
        assert_eq!(AuthError::from_provider_kind(kind), expected, "{kind}");
    }
}

#[test]
fn unknown_kind_is_generic_failure() {
    assert_eq!(AuthError::from_provider_kind("InternalErrorException"), AuthError::Failed);
    assert_eq!(AuthError::from_provider_kind(""), AuthError::Failed);
}

#[test]
fn messages_are_user_facing() {
    assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid email or password");
    assert_eq!(AuthError::RateLimited.to_string(), "Too many attempts. Please try again later");
    assert_eq!(AuthError::Failed.to_string(), "An error occurred. Please try again.");
    assert!(AuthError::WeakPassword.to_string().contains("8+ chars"));
}

#[test]
fn messages_never_carry_provider_identifiers() {
    for err in [
        AuthError::InvalidCredentials,
        AuthError::VerificationRequired,
        AuthError::ResetRequired,
        AuthError::RateLimited,
        AuthError::InvalidCode,
        AuthError::ExpiredCode,
        AuthError::WeakPassword,
        AuthError::Failed,
    ] {
        assert!(!err.to_string().contains("Exception"), "{err:?}");
    }
}
