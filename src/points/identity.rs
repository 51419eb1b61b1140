//! Disjunctive member identity.
//!
//! A points request may carry any non-empty subset of {memberId, memberCode,
//! email, phone}. There is no single canonical key, so resolution follows an
//! explicit precedence (id, then code, then email, then phone) and the first
//! hit wins. The order is part of the contract and must stay stable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation;

/// The identity keys accepted by every points operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A single lookup attempt, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(Uuid),
    Code(String),
    Email(String),
    Phone(String),
}

impl MemberKeys {
    pub fn from_email_phone(email: &str, phone: &str) -> Self {
        Self {
            member_id: None,
            member_code: None,
            email: non_empty(email),
            phone: non_empty(phone),
        }
    }

    /// No usable key at all.
    pub fn is_empty(&self) -> bool {
        self.lookups().is_empty()
    }

    /// Ordered lookup plan: id → code → email → phone. Malformed ids and
    /// codes are skipped rather than treated as errors.
    pub fn lookups(&self) -> Vec<Lookup> {
        let mut plan = Vec::new();
        if let Some(raw) = self.member_id.as_deref() {
            if let Ok(id) = Uuid::parse_str(raw.trim()) {
                plan.push(Lookup::Id(id));
            }
        }
        if let Some(code) = self.member_code.as_deref() {
            let code = code.trim();
            if validation::is_member_code(code) {
                plan.push(Lookup::Code(code.to_string()));
            }
        }
        if let Some(email) = self.email.as_deref() {
            let email = email.trim();
            if !email.is_empty() {
                plan.push(Lookup::Email(email.to_string()));
            }
        }
        if let Some(phone) = self.phone.as_deref() {
            let phone = phone.trim();
            if !phone.is_empty() {
                plan.push(Lookup::Phone(phone.to_string()));
            }
        }
        plan
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_precedence_order() {
        let id = Uuid::new_v4();
        let keys = MemberKeys {
            member_id: Some(id.to_string()),
            member_code: Some("MO0042".to_string()),
            email: Some("a@b.c".to_string()),
            phone: Some("0912345678".to_string()),
        };
        let plan = keys.lookups();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0], Lookup::Id(id));
        assert_eq!(plan[1], Lookup::Code("MO0042".to_string()));
        assert_eq!(plan[2], Lookup::Email("a@b.c".to_string()));
        assert_eq!(plan[3], Lookup::Phone("0912345678".to_string()));
    }

    #[test]
    fn test_malformed_keys_are_skipped() {
        let keys = MemberKeys {
            member_id: Some("not-a-uuid".to_string()),
            member_code: Some("XX123".to_string()),
            email: Some("  ".to_string()),
            phone: Some("0987654321".to_string()),
        };
        let plan = keys.lookups();
        assert_eq!(plan, vec![Lookup::Phone("0987654321".to_string())]);
    }

    #[test]
    fn test_empty_keys() {
        assert!(MemberKeys::default().is_empty());
        assert!(MemberKeys::from_email_phone("", " ").is_empty());
        assert!(!MemberKeys::from_email_phone("a@b.c", "").is_empty());
    }
}
