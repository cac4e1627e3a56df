use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::chain::{Chain, Decision, SlotName};
use crate::domain::identity::{UserId, SYSTEM_ACTOR};
use crate::domain::transaction::TransactionId;

type HmacSha256 = Hmac<Sha256>;

/// One immutable record per signing action or system-driven skip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub transaction_id: TransactionId,
    pub slot: SlotName,
    pub actor: String,
    pub decision: Decision,
    pub remarks: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn action(
        transaction_id: TransactionId,
        slot: SlotName,
        actor: &UserId,
        decision: Decision,
        remarks: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            transaction_id,
            slot,
            actor: actor.as_str().to_string(),
            decision,
            remarks,
            recorded_at,
        }
    }

    pub fn system_skip(
        transaction_id: TransactionId,
        slot: SlotName,
        reason: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            transaction_id,
            slot,
            actor: SYSTEM_ACTOR.to_string(),
            decision: Decision::Skipped,
            remarks: Some(reason.into()),
            recorded_at,
        }
    }

    pub fn is_system(&self) -> bool {
        self.actor == SYSTEM_ACTOR
    }
}

/// An audit entry sealed into the per-transaction hash chain.
///
/// `version` is the 1-based position in the trail; `entry_hash` commits to
/// the entry material and the previous hash; `signature` is an HMAC over
/// `entry_hash` with the trail signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedAuditEntry {
    pub entry: AuditEntry,
    pub version: u32,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailVerification {
    pub transaction_id: TransactionId,
    pub valid: bool,
    pub verified_entries: usize,
    pub latest_hash: Option<String>,
    pub failure_reason: Option<String>,
}

/// Seal `entry` as the successor of `prev` in its transaction's trail.
pub fn seal_entry(
    signing_key: &[u8],
    prev: Option<&SealedAuditEntry>,
    entry: AuditEntry,
) -> SealedAuditEntry {
    let version = prev.map(|sealed| sealed.version).unwrap_or(0).saturating_add(1);
    let prev_hash = prev.map(|sealed| sealed.entry_hash.clone());
    let entry_hash = hash_entry_material(&entry, version, prev_hash.as_deref());
    let signature = hmac_hex(signing_key, entry_hash.as_bytes());

    SealedAuditEntry { entry, version, prev_hash, entry_hash, signature }
}

/// Walk a transaction's trail in order, recomputing every hash and
/// signature. Any divergence marks the trail invalid at the first bad
/// entry.
pub fn verify_trail(
    signing_key: &[u8],
    transaction_id: &TransactionId,
    entries: &[SealedAuditEntry],
) -> TrailVerification {
    let mut previous_hash: Option<String> = None;

    for (index, sealed) in entries.iter().enumerate() {
        let expected_version = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        if sealed.version != expected_version {
            return failure(
                transaction_id,
                index,
                previous_hash,
                format!(
                    "version mismatch at entry {}: expected {}, found {}",
                    sealed.entry.entry_id, expected_version, sealed.version
                ),
            );
        }

        if sealed.prev_hash != previous_hash {
            return failure(
                transaction_id,
                index,
                previous_hash,
                format!("previous hash mismatch at entry {}", sealed.entry.entry_id),
            );
        }

        let computed =
            hash_entry_material(&sealed.entry, sealed.version, sealed.prev_hash.as_deref());
        if computed != sealed.entry_hash {
            return failure(
                transaction_id,
                index,
                previous_hash,
                format!("entry hash mismatch at entry {}", sealed.entry.entry_id),
            );
        }

        if hmac_hex(signing_key, sealed.entry_hash.as_bytes()) != sealed.signature {
            return failure(
                transaction_id,
                index,
                previous_hash,
                format!("signature mismatch at entry {}", sealed.entry.entry_id),
            );
        }

        previous_hash = Some(sealed.entry_hash.clone());
    }

    TrailVerification {
        transaction_id: transaction_id.clone(),
        valid: true,
        verified_entries: entries.len(),
        latest_hash: previous_hash,
        failure_reason: None,
    }
}

/// Re-apply a recorded trail to a freshly built chain.
///
/// The live chain remains the source of truth; replay exists so compliance
/// tooling can reconstruct decision state from the trail alone.
pub fn replay(mut chain: Chain, entries: &[AuditEntry]) -> Chain {
    for entry in entries {
        let Some(slot) = chain.slots.iter_mut().find(|slot| slot.slot == entry.slot) else {
            continue;
        };
        slot.decision = entry.decision;
        slot.decided_at = Some(entry.recorded_at);
        slot.remarks = entry.remarks.clone();
    }

    let rejected = chain.slots.iter().any(|slot| slot.decision == Decision::Rejected);
    chain.cursor = if rejected {
        None
    } else {
        chain.slots.iter().position(|slot| slot.decision == Decision::Pending)
    };
    chain.version =
        u32::try_from(entries.iter().filter(|entry| !entry.is_system()).count()).unwrap_or(u32::MAX);
    chain
}

fn failure(
    transaction_id: &TransactionId,
    verified: usize,
    latest_hash: Option<String>,
    reason: String,
) -> TrailVerification {
    TrailVerification {
        transaction_id: transaction_id.clone(),
        valid: false,
        verified_entries: verified,
        latest_hash,
        failure_reason: Some(reason),
    }
}

fn hash_entry_material(entry: &AuditEntry, version: u32, prev_hash: Option<&str>) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        entry.transaction_id.0,
        version,
        entry.slot.as_str(),
        entry.actor,
        entry.decision.as_str(),
        entry.remarks.as_deref().unwrap_or(""),
        entry.recorded_at.to_rfc3339(),
        prev_hash.unwrap_or(""),
    );
    sha256_hex(material.as_bytes())
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(payload),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    encode_hex(digest.as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
