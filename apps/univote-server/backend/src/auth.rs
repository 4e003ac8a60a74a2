//! Password credentials and account registration.

use nanoid::nanoid;
use time::OffsetDateTime;
use types_rs::univote::{normalize_university_id, Role, ValidationErrors, Voter, VoterInput};
use uuid::Uuid;

use crate::{error::Error, store::Store};

/// A salted password hash. The password itself is never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: String,
    pub hash: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").finish_non_exhaustive()
    }
}

impl Credential {
    /// Hashes `password` with a fresh random salt.
    pub fn new(password: &str) -> Self {
        let salt = nanoid!();
        let hash = Self::hash(&salt, password);
        Self { salt, hash }
    }

    fn hash(salt: &str, password: &str) -> String {
        hex::encode(hmac_sha256::HMAC::mac(password.as_bytes(), salt.as_bytes()))
    }

    pub fn verify(&self, password: &str) -> bool {
        let candidate = Self::hash(&self.salt, password);
        constant_time_eq(candidate.as_bytes(), self.hash.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Checks a login attempt. Unknown accounts and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate(
    store: &dyn Store,
    university_id: &str,
    password: &str,
) -> Result<Voter, Error> {
    let university_id = normalize_university_id(university_id);
    let Some((voter, credential)) = store.find_credentials(&university_id).await? else {
        tracing::debug!("login attempt for unknown university ID");
        return Err(Error::Unauthorized(
            "Invalid university ID or password".to_owned(),
        ));
    };

    if !credential.verify(password) {
        tracing::debug!(voter_id = %voter.id, "login attempt with wrong password");
        return Err(Error::Unauthorized(
            "Invalid university ID or password".to_owned(),
        ));
    }

    if !voter.is_active {
        tracing::info!(voter_id = %voter.id, "deactivated account tried to log in");
        return Err(Error::Forbidden(
            "This account has been deactivated".to_owned(),
        ));
    }

    Ok(voter)
}

/// Creates an account after validating `input`.
pub async fn register(
    store: &dyn Store,
    input: VoterInput,
    role: Role,
    now: OffsetDateTime,
) -> Result<Voter, Error> {
    input.validate(role)?;

    let voter = Voter {
        id: Uuid::new_v4(),
        university_id: normalize_university_id(&input.university_id),
        name: input.name.trim().to_owned(),
        faculty: input.faculty,
        role,
        is_active: true,
        created_at: now,
    };
    let credential = Credential::new(&input.password);

    if !store.create_voter(&voter, &credential).await? {
        return Err(ValidationErrors::new(
            "universityId",
            "This university ID is already registered",
        )
        .into());
    }

    tracing::info!(voter_id = %voter.id, role = role.as_str(), "registered account");
    Ok(voter)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;
    use types_rs::univote::{ErrorCode, Faculty};

    use super::*;
    use crate::memory::MemoryStore;

    fn input(university_id: &str) -> VoterInput {
        VoterInput {
            university_id: university_id.to_owned(),
            name: "Grace Hopper".to_owned(),
            faculty: Some(Faculty::try_from("Science").unwrap()),
            password: "Compiler1952".to_owned(),
        }
    }

    #[test]
    fn test_credential() {
        let credential = Credential::new("Secret123");
        assert!(credential.verify("Secret123"));
        assert!(!credential.verify("secret123"));
        assert!(!credential.verify(""));

        let other = Credential::new("Secret123");
        assert_ne!(credential.salt, other.salt);
        assert_ne!(credential.hash, other.hash);
    }

    #[test]
    fn test_credential_debug_hides_hash() {
        let credential = Credential::new("Secret123");
        assert!(!format!("{credential:?}").contains(&credential.hash));
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let store = MemoryStore::new();
        let now = datetime!(2025-01-01 0:00 UTC);

        let voter = register(&store, input(" SCI042 "), Role::Voter, now)
            .await
            .unwrap();
        assert_eq!(voter.university_id, "SCI042");
        assert!(voter.is_active);

        let authenticated = authenticate(&store, "SCI042", "Compiler1952").await.unwrap();
        assert_eq!(authenticated, voter);

        let error = authenticate(&store, "SCI042", "wrong").await.unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Unauthorized);

        let error = authenticate(&store, "NOPE01", "Compiler1952").await.unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_duplicate_university_id() {
        let store = MemoryStore::new();
        let now = datetime!(2025-01-01 0:00 UTC);

        register(&store, input("SCI042"), Role::Voter, now).await.unwrap();
        let error = register(&store, input("SCI042"), Role::Voter, now)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_university_id_ignores_case() {
        let store = MemoryStore::new();
        let now = datetime!(2025-01-01 0:00 UTC);

        let voter = register(&store, input("sci042"), Role::Voter, now)
            .await
            .unwrap();
        assert_eq!(voter.university_id, "SCI042");

        // the same student under another spelling is still one account
        let error = register(&store, input("Sci042"), Role::Voter, now)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Validation);
        assert_eq!(store.list_voters().await.unwrap().len(), 1);

        for spelling in ["SCI042", "sci042", " Sci042 "] {
            let authenticated = authenticate(&store, spelling, "Compiler1952")
                .await
                .unwrap();
            assert_eq!(authenticated.id, voter.id);
        }
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_log_in() {
        let store = MemoryStore::new();
        let now = datetime!(2025-01-01 0:00 UTC);

        let voter = register(&store, input("SCI042"), Role::Voter, now).await.unwrap();
        assert!(store.set_voter_active(voter.id, false).await.unwrap());

        let error = authenticate(&store, "SCI042", "Compiler1952").await.unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Forbidden);
    }
}
