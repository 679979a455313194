use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Identifier of a case in the external case-management system.
    ///
    /// The engine never loads case records; it only scopes plans, ledger
    /// movements and history events by this id.
    ///
    /// # Examples
    ///
    /// ```
    /// use repayment_engine::core::ids::CaseId;
    ///
    /// let case = CaseId::new(42);
    /// assert_eq!(case.to_string(), "42");
    /// ```
    CaseId
);

row_id!(
    /// Row id of an [`InterestRate`](crate::core::rate::InterestRate) record.
    RateId
);

row_id!(
    /// Row id of a [`Plan`](crate::core::plan::Plan).
    PlanId
);

row_id!(
    /// Row id of an [`Installment`](crate::core::plan::Installment).
    InstallmentId
);

/// Identifier of a movement posted to the ledger collaborator.
///
/// Opaque to the engine: it is stored on installments and plans so the
/// movement can be deleted again on reversal or reopening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

impl MovementId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MovementId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
