use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::infra::app_error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Employee,
    Cook,
    Admin,
}

/// Every operation a handler guards with a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewMenu,
    ViewTables,
    ManageCart,
    PlaceCartOrder,
    ViewOwnOrders,
    CreateReservation,
    ViewOwnReservations,
    PlaceWalkInOrder,
    SetTableStatus,
    ViewKitchenQueue,
    UpdateOrderStatus,
    ViewAllOrders,
    ManageReservations,
    ManageTables,
    ManageProducts,
}

impl Role {
    pub fn permits(self, action: Action) -> bool {
        use Role::*;

        match action {
            Action::ViewMenu | Action::ViewTables => true,
            Action::ManageCart
            | Action::PlaceCartOrder
            | Action::ViewOwnOrders
            | Action::CreateReservation
            | Action::ViewOwnReservations => matches!(self, Customer),
            Action::PlaceWalkInOrder | Action::SetTableStatus => matches!(self, Employee | Admin),
            Action::ViewKitchenQueue | Action::UpdateOrderStatus => matches!(self, Cook | Admin),
            Action::ViewAllOrders
            | Action::ManageReservations
            | Action::ManageTables
            | Action::ManageProducts => matches!(self, Admin),
        }
    }
}

/// Identity resolved once per request from a verified credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: i32,
    pub role: Role,
}

impl CurrentUser {
    pub fn authorize(&self, action: Action) -> Result<(), AppError> {
        if self.role.permits(action) {
            Ok(())
        } else {
            Err(AppError::ForbiddenResource(format!(
                "Role {:?} may not perform {:?}",
                self.role, action
            )))
        }
    }
}

/// Maps a bearer credential to the caller's identity.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<CurrentUser, AppError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, carried as a string like every registered `sub` claim.
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

/// HS256 JWT verifier sharing its secret with the token issuer.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<CurrentUser, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("Rejected expired token"),
                _ => tracing::debug!("Rejected token: {}", e),
            }
            AppError::Unauthorized
        })?;

        let user_id = data.claims.sub.parse::<i32>().map_err(|_| {
            tracing::debug!("Rejected token with non-numeric subject {:?}", data.claims.sub);
            AppError::Unauthorized
        })?;

        Ok(CurrentUser {
            user_id,
            role: data.claims.role,
        })
    }
}

pub fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}
