/// Authentication and authorization core
///
/// # Modules
///
/// - [`permissions`]: role hierarchy and the injectable capability map
/// - [`guards`]: pure group-scoped permission checks over a [`guards::CurrentUser`]
/// - [`password`]: Argon2id hashing
/// - [`jwt`]: signed session and challenge tokens
/// - [`session`]: cookie sessions backed by the session store
/// - [`two_factor`]: TOTP secrets, provisioning QR codes and code checks
///
/// # Example
///
/// ```no_run
/// use memora_shared::auth::password::{hash_password, verify_password};
/// use memora_shared::auth::permissions::{Capability, CapabilityMap, Role};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Gr0up!Chores")?;
/// assert!(verify_password("Gr0up!Chores", &hash)?);
///
/// let map = CapabilityMap::standard();
/// assert!(map.allows(Role::Admin, Capability::RemoveMember));
/// # Ok(())
/// # }
/// ```

pub mod guards;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod session;
pub mod two_factor;
