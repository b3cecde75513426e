//! Venue attribution: which known trading program a transaction routed through.

use std::collections::HashMap;

use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter};
use wallet_ledger_domain::model::{RawTransaction, UNKNOWN_VENUE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
pub enum Venue {
    Jupiter,
    #[strum(serialize = "GMGN")]
    Gmgn,
    #[strum(serialize = "Pump.fun")]
    PumpFun,
    Moonshot,
    Meteora,
    Raydium,
    Orca,
    FluxBeam,
}

/// Tie-break order when several venues appear in one transaction, highest
/// priority first. Aggregators outrank the pools they route through.
pub const VENUE_PRIORITY: [Venue; 8] = [
    Venue::Jupiter,
    Venue::Gmgn,
    Venue::PumpFun,
    Venue::Moonshot,
    Venue::Meteora,
    Venue::Raydium,
    Venue::Orca,
    Venue::FluxBeam,
];

impl Venue {
    /// Program ids attributed to the venue; the first entry is the primary
    /// program recorded as swap counterparty.
    pub fn program_ids(self) -> &'static [&'static str] {
        match self {
            Self::Jupiter => &[
                "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
                "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
                "JUP3c2Uh3WA4Ng34tw6kPd2G4C5BB21Xo36Je1s32Ph",
            ],
            Self::Gmgn => &["GMGNjvGr7ddxt2u1XSf8Zo6LLnDjDm9mJahGfhq7j6gk"],
            Self::PumpFun => &[
                "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P",
                "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA",
            ],
            Self::Moonshot => &["MoonCVVNZFSYkqNXP6bxHLPL6QQJiMagDL3qcqUQTrG"],
            Self::Meteora => &[
                "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
                "cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG",
                "dbcij3LWUppWqq96dh6gJWwBifmcGfLSB5D4DuSMaqN",
            ],
            Self::Raydium => &[
                "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
                "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
                "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
            ],
            Self::Orca => &[
                "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
                "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP",
            ],
            Self::FluxBeam => &["FLUXubRmkEi2q6K3Y9kBPg9248ggaZVsoSFhtJHSrm1X"],
        }
    }

    pub fn primary_program_id(self) -> &'static str {
        self.program_ids()[0]
    }

    pub fn from_program_id(program_id: &str) -> Option<Self> {
        Self::iter().find(|venue| venue.program_ids().contains(&program_id))
    }
}

/// Where a venue's program id was found, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Evidence {
    TopLevelInstruction,
    InnerInstruction,
    AccountKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueMatch {
    pub venue: Venue,
    pub evidence: Evidence,
}

type EvidenceSource = fn(&RawTransaction) -> Vec<&str>;

/// Candidate collectors. Every source contributes; a venue keeps the
/// strongest evidence it was seen with.
const EVIDENCE_SOURCES: [(Evidence, EvidenceSource); 3] = [
    (Evidence::TopLevelInstruction, top_level_programs),
    (Evidence::InnerInstruction, inner_programs),
    (Evidence::AccountKey, account_keys),
];

fn top_level_programs(tx: &RawTransaction) -> Vec<&str> {
    tx.instructions.iter().map(|ix| ix.program_id.as_str()).collect()
}

fn inner_programs(tx: &RawTransaction) -> Vec<&str> {
    tx.inner_instructions
        .iter()
        .map(|ix| ix.program_id.as_str())
        .collect()
}

fn account_keys(tx: &RawTransaction) -> Vec<&str> {
    tx.account_keys.iter().map(|key| key.pubkey.as_str()).collect()
}

/// Picks the highest-priority venue among every candidate found in the
/// transaction, or `None` when no known program is involved.
pub fn detect(tx: &RawTransaction) -> Option<VenueMatch> {
    let mut found: HashMap<Venue, Evidence> = HashMap::new();
    for (evidence, source) in EVIDENCE_SOURCES {
        for program_id in source(tx) {
            if let Some(venue) = Venue::from_program_id(program_id) {
                found
                    .entry(venue)
                    .and_modify(|seen| *seen = (*seen).min(evidence))
                    .or_insert(evidence);
            }
        }
    }

    VENUE_PRIORITY.iter().find_map(|venue| {
        found.get(venue).map(|evidence| VenueMatch {
            venue: *venue,
            evidence: *evidence,
        })
    })
}

pub fn venue_name(detected: Option<&VenueMatch>) -> String {
    detected.map_or_else(|| UNKNOWN_VENUE.to_string(), |found| found.venue.to_string())
}
