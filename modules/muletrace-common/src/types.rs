use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Entity kinds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BankAccount,
    CryptoWallet,
    EWallet,
    PhoneNumber,
    QrisCode,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::BankAccount,
        EntityKind::CryptoWallet,
        EntityKind::EWallet,
        EntityKind::PhoneNumber,
        EntityKind::QrisCode,
    ];

    /// Node label used in the graph store.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::BankAccount => "BankAccount",
            EntityKind::CryptoWallet => "CryptoWallet",
            EntityKind::EWallet => "EWallet",
            EntityKind::PhoneNumber => "PhoneNumber",
            EntityKind::QrisCode => "QrisCode",
        }
    }

    /// Property that uniquely identifies an entity of this kind.
    /// Uniqueness is scoped per kind: a bank account number and a phone
    /// number may share a string without conflict.
    pub fn key_property(&self) -> &'static str {
        match self {
            EntityKind::BankAccount => "account_number",
            EntityKind::CryptoWallet => "wallet_address",
            EntityKind::EWallet => "wallet_id",
            EntityKind::PhoneNumber => "phone_number",
            EntityKind::QrisCode => "qris_code",
        }
    }

    pub fn parse(s: &str) -> Option<EntityKind> {
        match s.trim() {
            "bank_account" => Some(EntityKind::BankAccount),
            "crypto_wallet" => Some(EntityKind::CryptoWallet),
            "e_wallet" => Some(EntityKind::EWallet),
            "phone_number" => Some(EntityKind::PhoneNumber),
            "qris" | "qris_code" => Some(EntityKind::QrisCode),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::BankAccount => write!(f, "bank_account"),
            EntityKind::CryptoWallet => write!(f, "crypto_wallet"),
            EntityKind::EWallet => write!(f, "e_wallet"),
            EntityKind::PhoneNumber => write!(f, "phone_number"),
            EntityKind::QrisCode => write!(f, "qris_code"),
        }
    }
}

// --- Shared entity metadata ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Externally assigned 0-100 suspicion ranking. Zero means unranked;
    /// an unranked upsert never lowers a stored ranking.
    #[serde(default)]
    pub priority_score: i64,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
    /// Opaque reference to an externally stored evidence image.
    #[serde(default)]
    pub oss_key: Option<String>,
    /// Tier tag set by the topology generator only; never populated by
    /// real extraction data.
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub synthetic: bool,
}

impl EntityMeta {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            priority_score: 0,
            last_update: Utc::now(),
            oss_key: None,
            cluster_id: None,
            synthetic: false,
        }
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

// --- Entity variants ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccountEntity {
    #[serde(default)]
    pub meta: EntityMeta,
    pub account_number: String,
    pub bank_name: String,
    pub account_holder: String,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub min_transfer: Option<f64>,
    #[serde(default)]
    pub max_transfer: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoWalletEntity {
    #[serde(default)]
    pub meta: EntityMeta,
    pub wallet_address: String,
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EWalletEntity {
    #[serde(default)]
    pub meta: EntityMeta,
    pub provider: String,
    pub number: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl EWalletEntity {
    /// Composite identity: the same number under two providers is two
    /// distinct wallets.
    pub fn wallet_id(&self) -> String {
        format!("{}:{}", self.provider.trim().to_lowercase(), self.number.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneNumberEntity {
    #[serde(default)]
    pub meta: EntityMeta,
    pub phone_number: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrisCodeEntity {
    #[serde(default)]
    pub meta: EntityMeta,
    pub qris_code: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

// --- Sum type ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    BankAccount(BankAccountEntity),
    CryptoWallet(CryptoWalletEntity),
    EWallet(EWalletEntity),
    PhoneNumber(PhoneNumberEntity),
    QrisCode(QrisCodeEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::BankAccount(_) => EntityKind::BankAccount,
            Entity::CryptoWallet(_) => EntityKind::CryptoWallet,
            Entity::EWallet(_) => EntityKind::EWallet,
            Entity::PhoneNumber(_) => EntityKind::PhoneNumber,
            Entity::QrisCode(_) => EntityKind::QrisCode,
        }
    }

    /// Identifying key within this entity's kind.
    pub fn key(&self) -> String {
        match self {
            Entity::BankAccount(e) => e.account_number.trim().to_string(),
            Entity::CryptoWallet(e) => e.wallet_address.trim().to_string(),
            Entity::EWallet(e) => e.wallet_id(),
            Entity::PhoneNumber(e) => e.phone_number.trim().to_string(),
            Entity::QrisCode(e) => e.qris_code.trim().to_string(),
        }
    }

    pub fn meta(&self) -> &EntityMeta {
        match self {
            Entity::BankAccount(e) => &e.meta,
            Entity::CryptoWallet(e) => &e.meta,
            Entity::EWallet(e) => &e.meta,
            Entity::PhoneNumber(e) => &e.meta,
            Entity::QrisCode(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EntityMeta {
        match self {
            Entity::BankAccount(e) => &mut e.meta,
            Entity::CryptoWallet(e) => &mut e.meta,
            Entity::EWallet(e) => &mut e.meta,
            Entity::PhoneNumber(e) => &mut e.meta,
            Entity::QrisCode(e) => &mut e.meta,
        }
    }

    /// Name of the person behind the account, where the kind carries one.
    pub fn holder_name(&self) -> Option<&str> {
        match self {
            Entity::BankAccount(e) => Some(e.account_holder.as_str()),
            Entity::EWallet(e) => e.owner_name.as_deref(),
            _ => None,
        }
    }

    /// Reject malformed entities before they are ever written. Validation
    /// is non-fatal at the batch level: a failing entity is dropped, the
    /// rest of the batch proceeds.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Entity::BankAccount(e) => {
                if e.account_number.trim().is_empty() {
                    return Err("bank account is missing an account number".into());
                }
                if e.bank_name.trim().is_empty() {
                    return Err(format!("account {} is missing a bank name", e.account_number));
                }
                if e.account_holder.trim().is_empty() {
                    return Err(format!("account {} is missing a holder name", e.account_number));
                }
            }
            Entity::CryptoWallet(e) => {
                if e.wallet_address.trim().is_empty() {
                    return Err("crypto wallet is missing an address".into());
                }
                if e.currency.trim().is_empty() {
                    return Err(format!("wallet {} is missing a currency", e.wallet_address));
                }
            }
            Entity::EWallet(e) => {
                if e.provider.trim().is_empty() {
                    return Err("e-wallet is missing a provider".into());
                }
                if e.number.trim().is_empty() {
                    return Err(format!("{} e-wallet is missing a number", e.provider));
                }
            }
            Entity::PhoneNumber(e) => {
                if e.phone_number.trim().is_empty() {
                    return Err("phone entry is missing a number".into());
                }
            }
            Entity::QrisCode(e) => {
                if e.qris_code.trim().is_empty() {
                    return Err("QRIS entry is missing a code".into());
                }
            }
        }
        Ok(())
    }
}

// --- Site ---

/// One suspect website, keyed by normalized domain (scheme + host).
/// Multiple crawled pages of a site collapse onto a single node; the full
/// page URL survives in `original_url` for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub original_url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub registration_outcome: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub synthetic: bool,
}

impl SiteRecord {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            name: None,
            language: None,
            registration_outcome: None,
            notes: None,
            synthetic: false,
        }
    }
}

// --- Extraction boundary ---

/// Output of the page-extraction collaborator: site metadata plus candidate
/// entities per kind. This core only accepts the record; it never drives
/// the extraction itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub site: SiteRecord,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccountEntity>,
    #[serde(default)]
    pub crypto_wallets: Vec<CryptoWalletEntity>,
    #[serde(default)]
    pub e_wallets: Vec<EWalletEntity>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumberEntity>,
    #[serde(default)]
    pub qris_codes: Vec<QrisCodeEntity>,
}

impl ExtractionResult {
    pub fn into_entities(self) -> (SiteRecord, Vec<Entity>) {
        let mut entities = Vec::new();
        entities.extend(self.bank_accounts.into_iter().map(Entity::BankAccount));
        entities.extend(self.crypto_wallets.into_iter().map(Entity::CryptoWallet));
        entities.extend(self.e_wallets.into_iter().map(Entity::EWallet));
        entities.extend(self.phone_numbers.into_iter().map(Entity::PhoneNumber));
        entities.extend(self.qris_codes.into_iter().map(Entity::QrisCode));
        (self.site, entities)
    }
}

// --- Transfers ---

/// One observed or synthesized money movement. Never deduplicated: each
/// transfer is its own edge even when source, target, and amount repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_key: String,
    pub to_key: String,
    pub amount: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub synthetic: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(number: &str, bank_name: &str, holder: &str) -> Entity {
        Entity::BankAccount(BankAccountEntity {
            meta: EntityMeta::new(),
            account_number: number.into(),
            bank_name: bank_name.into(),
            account_holder: holder.into(),
            bank_code: None,
            account_type: None,
            min_transfer: None,
            max_transfer: None,
            processing_time: None,
        })
    }

    #[test]
    fn bank_account_requires_number_bank_and_holder() {
        assert!(bank("1234567890", "BCA", "Budi Santoso").validate().is_ok());
        assert!(bank("", "BCA", "Budi Santoso").validate().is_err());
        assert!(bank("1234567890", "  ", "Budi Santoso").validate().is_err());
        assert!(bank("1234567890", "BCA", "").validate().is_err());
    }

    #[test]
    fn crypto_wallet_requires_address_and_currency() {
        let wallet = Entity::CryptoWallet(CryptoWalletEntity {
            meta: EntityMeta::new(),
            wallet_address: "0xabc".into(),
            currency: "".into(),
            notes: None,
        });
        assert!(wallet.validate().is_err());
    }

    #[test]
    fn e_wallet_key_is_provider_scoped() {
        let a = EWalletEntity {
            meta: EntityMeta::new(),
            provider: "OVO".into(),
            number: "081234567890".into(),
            phone_number: None,
            owner_name: None,
        };
        let b = EWalletEntity {
            meta: EntityMeta::new(),
            provider: "DANA".into(),
            number: "081234567890".into(),
            phone_number: None,
            owner_name: None,
        };
        assert_eq!(a.wallet_id(), "ovo:081234567890");
        assert_ne!(a.wallet_id(), b.wallet_id());
    }

    #[test]
    fn kind_parse_round_trips() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(EntityKind::parse("qris"), Some(EntityKind::QrisCode));
        assert_eq!(EntityKind::parse("savings_account"), None);
    }

    #[test]
    fn extraction_result_flattens_all_kinds() {
        let result = ExtractionResult {
            site: SiteRecord::new("https://example.com/deposit"),
            bank_accounts: vec![BankAccountEntity {
                meta: EntityMeta::new(),
                account_number: "111".into(),
                bank_name: "BRI".into(),
                account_holder: "Siti".into(),
                bank_code: None,
                account_type: None,
                min_transfer: None,
                max_transfer: None,
                processing_time: None,
            }],
            crypto_wallets: vec![],
            e_wallets: vec![EWalletEntity {
                meta: EntityMeta::new(),
                provider: "OVO".into(),
                number: "0811".into(),
                phone_number: None,
                owner_name: None,
            }],
            phone_numbers: vec![],
            qris_codes: vec![],
        };
        let (_, entities) = result.into_entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].kind(), EntityKind::BankAccount);
        assert_eq!(entities[1].kind(), EntityKind::EWallet);
    }
}
