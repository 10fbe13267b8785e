use serde::{Deserialize, Serialize};

/// Contact details entered on the first wizard screen.
///
/// Optional fields are `None` rather than empty strings; [`CustomerInfo::normalized`]
/// is applied whenever a record enters the wizard so consumers never see `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposal_date: Option<String>,
}

impl CustomerInfo {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            phone: phone.into(),
            ..Default::default()
        }
    }

    /// Collapses blank optional fields to `None`.
    pub fn normalized(mut self) -> Self {
        self.email = non_blank(self.email);
        self.disposal_date = non_blank(self.disposal_date);
        self
    }

    /// Applies every field present in `patch`.
    pub fn apply(
        &mut self,
        patch: CustomerInfoPatch,
    ) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(address) = patch.address {
            self.address = address;
        }
        if let Some(phone) = patch.phone {
            self.phone = phone;
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(disposal_date) = patch.disposal_date {
            self.disposal_date = Some(disposal_date);
        }
        self.email = non_blank(self.email.take());
        self.disposal_date = non_blank(self.disposal_date.take());
    }
}

/// Field-by-field update for [`CustomerInfo`]. An empty string clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfoPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub disposal_date: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
