//! Vending machine domain model.
//!
//! Category, status and payment method are closed enums. Their kebab-case
//! string form only exists at serialization boundaries (`serde`, `FromStr`,
//! `as_str`); domain code never handles the raw strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string that did not name any variant of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Beverage,
    Food,
    Ice,
    Tobacco,
    MultiPurpose,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Beverage,
        Category::Food,
        Category::Ice,
        Category::Tobacco,
        Category::MultiPurpose,
        Category::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Beverage => "beverage",
            Category::Food => "food",
            Category::Ice => "ice",
            Category::Tobacco => "tobacco",
            Category::MultiPurpose => "multi-purpose",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "category",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingStatus {
    Operating,
    UnderMaintenance,
    OutOfOrder,
}

impl OperatingStatus {
    pub const ALL: [OperatingStatus; 3] = [
        OperatingStatus::Operating,
        OperatingStatus::UnderMaintenance,
        OperatingStatus::OutOfOrder,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingStatus::Operating => "operating",
            OperatingStatus::UnderMaintenance => "under-maintenance",
            OperatingStatus::OutOfOrder => "out-of-order",
        }
    }
}

impl std::fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatingStatus::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "operating status",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    Card,
    ElectronicMoney,
    QrCode,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::ElectronicMoney,
        PaymentMethod::QrCode,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::ElectronicMoney => "electronic-money",
            PaymentMethod::QrCode => "qr-code",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "payment method",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components finite and inside the WGS84 ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        crate::validation::validate_latitude(self.latitude)
            && crate::validation::validate_longitude(self.longitude)
    }
}

/// Public URLs of an attached photo and its thumbnail.
///
/// Both URLs travel together so a machine can never carry only one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_url: String,
    pub thumbnail_url: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Assigned by the remote store on creation.
    pub id: String,
    pub coordinate: Coordinate,
    pub description: String,
    pub category: Category,
    pub status: OperatingStatus,
    pub payment_methods: Vec<PaymentMethod>,
    /// Server-assigned; advances on every write.
    pub last_updated: DateTime<Utc>,
    pub image: Option<ImageRef>,
}

impl Machine {
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Validated creation payload. Produced by
/// [`MachineDraft::into_new_machine`](crate::validation::MachineDraft::into_new_machine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMachine {
    pub coordinate: Coordinate,
    pub description: String,
    pub category: Category,
    pub status: OperatingStatus,
    pub payment_methods: Vec<PaymentMethod>,
}

impl NewMachine {
    /// Materialize the stored record. New machines never carry an image.
    #[must_use]
    pub fn into_machine(self, id: String, last_updated: DateTime<Utc>) -> Machine {
        Machine {
            id,
            coordinate: self.coordinate,
            description: self.description,
            category: self.category,
            status: self.status,
            payment_methods: self.payment_methods,
            last_updated,
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImagePatch {
    Attach(ImageRef),
    Detach,
}

/// Partial update. `None` fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachinePatch {
    pub coordinate: Option<Coordinate>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub status: Option<OperatingStatus>,
    pub payment_methods: Option<Vec<PaymentMethod>>,
    pub image: Option<ImagePatch>,
}

impl MachinePatch {
    #[must_use]
    pub fn attach_image(image: ImageRef) -> Self {
        Self {
            image: Some(ImagePatch::Attach(image)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn status(status: OperatingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinate.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.status.is_none()
            && self.payment_methods.is_none()
            && self.image.is_none()
    }

    /// Apply the present fields to `machine`. The caller stamps `last_updated`.
    pub fn apply_to(&self, machine: &mut Machine) {
        if let Some(coordinate) = self.coordinate {
            machine.coordinate = coordinate;
        }
        if let Some(description) = &self.description {
            machine.description.clone_from(description);
        }
        if let Some(category) = self.category {
            machine.category = category;
        }
        if let Some(status) = self.status {
            machine.status = status;
        }
        if let Some(methods) = &self.payment_methods {
            machine.payment_methods.clone_from(methods);
        }
        match &self.image {
            Some(ImagePatch::Attach(image)) => machine.image = Some(image.clone()),
            Some(ImagePatch::Detach) => machine.image = None,
            None => {}
        }
    }
}
