//! Turns one resolved transaction into zero or more wallet events.
//!
//! Classification runs through fixed stages and the first stage that claims
//! the transaction decides the result:
//!
//! 1. failed transactions produce nothing;
//! 2. token burns by the wallet, then rent recovered from closed accounts;
//! 3. swaps, when a known venue is involved;
//! 4. plain transfers.

use std::collections::HashSet;

use serde_json::Value;
use wallet_ledger_domain::model::{
    to_ui_amount, BalanceDelta, EventType, ParsedInstruction, RawTransaction, NATIVE_ASSET_ID,
    NATIVE_DECIMALS, SYSTEM_PROGRAM_ID, UNKNOWN_ASSET_ID,
};

use crate::extract::token_deltas_by_owner;
use crate::venue::{venue_name, VenueMatch};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Programs and sysvars that never count as a transfer counterparty.
const STRUCTURAL_ACCOUNTS: &[&str] = &[
    SYSTEM_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
    TOKEN_2022_PROGRAM_ID,
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "ComputeBudget111111111111111111111111111111",
    "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
    "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo",
    "SysvarRent111111111111111111111111111111111",
    "SysvarC1ock11111111111111111111111111111111",
];

/// A classified event before price and metadata enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub event_type: EventType,
    pub venue: String,
    pub asset_id: String,
    pub amount: f64,
    pub counterparty_from: Option<String>,
    pub counterparty_to: Option<String>,
}

pub struct ClassifyInput<'a> {
    pub tx: &'a RawTransaction,
    pub wallet: &'a str,
    pub deltas: &'a [BalanceDelta],
    pub venue: Option<VenueMatch>,
}

pub fn classify(input: &ClassifyInput<'_>) -> Vec<ClassifiedEvent> {
    if input.tx.is_failed() {
        return Vec::new();
    }

    let burns = burn_events(input);
    if !burns.is_empty() {
        return burns;
    }

    let closes = close_events(input);
    if !closes.is_empty() {
        return closes;
    }

    match input.venue {
        Some(found) => swap_event(input, &found).into_iter().collect(),
        None => transfer_events(input),
    }
}

fn is_token_program(program_id: &str) -> bool {
    program_id == TOKEN_PROGRAM_ID || program_id == TOKEN_2022_PROGRAM_ID
}

/// Token-program instructions of one of the given kinds, top-level and inner.
fn token_instructions<'a>(
    tx: &'a RawTransaction,
    kinds: &'a [&'a str],
) -> impl Iterator<Item = &'a ParsedInstruction> + 'a {
    tx.all_instructions()
        .filter(|ix| is_token_program(&ix.program_id))
        .filter_map(|ix| ix.parsed.as_ref())
        .filter(move |parsed| kinds.contains(&parsed.kind.as_str()))
}

/// Token accounts owned by the wallet, by pubkey.
fn wallet_token_accounts<'a>(tx: &'a RawTransaction, wallet: &str) -> HashSet<&'a str> {
    tx.pre_token_balances
        .iter()
        .chain(tx.post_token_balances.iter())
        .filter(|balance| balance.owner.as_deref() == Some(wallet))
        .filter_map(|balance| tx.account_key(balance.account_index))
        .collect()
}

/// Mint and precision recorded for a token account, pre-balances first.
fn token_account_mint<'a>(tx: &'a RawTransaction, account: &str) -> Option<(&'a str, u8)> {
    let index = tx.account_index(account)?;
    tx.pre_token_balances
        .iter()
        .chain(tx.post_token_balances.iter())
        .find(|balance| balance.account_index == index)
        .map(|balance| (balance.mint.as_str(), balance.decimals))
}

fn mint_decimals(tx: &RawTransaction, mint: &str) -> Option<u8> {
    tx.pre_token_balances
        .iter()
        .chain(tx.post_token_balances.iter())
        .find(|balance| balance.mint == mint)
        .map(|balance| balance.decimals)
}

fn parse_raw_amount(value: Option<&Value>) -> Option<u128> {
    match value? {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.as_u64().map(u128::from),
        _ => None,
    }
}

fn burn_events(input: &ClassifyInput<'_>) -> Vec<ClassifiedEvent> {
    let tx = input.tx;
    let owned = wallet_token_accounts(tx, input.wallet);
    let venue = venue_name(input.venue.as_ref());

    let mut events: Vec<ClassifiedEvent> = Vec::new();
    for burn in token_instructions(tx, &["burn", "burnChecked"]) {
        let account = burn.info_str("account");
        let authority = burn
            .info_str("authority")
            .or_else(|| burn.info_str("multisigAuthority"));
        let touches_wallet = authority == Some(input.wallet)
            || account.is_some_and(|account| owned.contains(account));
        if !touches_wallet {
            continue;
        }

        let by_account = account.and_then(|account| token_account_mint(tx, account));
        let Some(mint) = burn
            .info_str("mint")
            .or(by_account.map(|(mint, _)| mint))
        else {
            continue;
        };

        let token_amount = burn.info.get("tokenAmount");
        let Some(raw) = parse_raw_amount(burn.info.get("amount"))
            .or_else(|| parse_raw_amount(token_amount.and_then(|amount| amount.get("amount"))))
        else {
            continue;
        };
        let decimals = token_amount
            .and_then(|amount| amount.get("decimals"))
            .and_then(Value::as_u64)
            .and_then(|decimals| u8::try_from(decimals).ok())
            .or(by_account.map(|(_, decimals)| decimals))
            .or_else(|| mint_decimals(tx, mint))
            .unwrap_or(0);

        let amount = -to_ui_amount(i128::try_from(raw).unwrap_or(i128::MAX), decimals).abs();
        merge_by_asset(
            &mut events,
            ClassifiedEvent {
                event_type: EventType::Burn,
                venue: venue.clone(),
                asset_id: mint.to_string(),
                amount,
                counterparty_from: Some(input.wallet.to_string()),
                counterparty_to: None,
            },
        );
    }
    events
}

fn close_events(input: &ClassifyInput<'_>) -> Vec<ClassifiedEvent> {
    let tx = input.tx;
    let venue = venue_name(input.venue.as_ref());
    let wallet_native = input
        .deltas
        .iter()
        .find(|delta| delta.is_native())
        .map_or(0, |delta| delta.raw_delta);

    let mut events: Vec<ClassifiedEvent> = Vec::new();
    for close in token_instructions(tx, &["closeAccount"]) {
        if close.info_str("destination") != Some(input.wallet) {
            continue;
        }
        let account = close.info_str("account");
        let asset_id = account
            .and_then(|account| token_account_mint(tx, account))
            .map_or(UNKNOWN_ASSET_ID, |(mint, _)| mint);

        let recovered = account
            .and_then(|account| tx.account_index(account))
            .and_then(|index| tx.pre_balances.get(index).copied())
            .map(i128::from)
            .filter(|lamports| *lamports > 0)
            .unwrap_or_else(|| wallet_native.max(0));

        merge_by_asset(
            &mut events,
            ClassifiedEvent {
                event_type: EventType::Close,
                venue: venue.clone(),
                asset_id: asset_id.to_string(),
                amount: to_ui_amount(recovered, NATIVE_DECIMALS),
                counterparty_from: Some(SYSTEM_PROGRAM_ID.to_string()),
                counterparty_to: Some(input.wallet.to_string()),
            },
        );
    }
    events
}

/// Events share one row per asset, so repeated instructions on the same
/// asset are summed.
fn merge_by_asset(events: &mut Vec<ClassifiedEvent>, event: ClassifiedEvent) {
    match events
        .iter_mut()
        .find(|existing| existing.asset_id == event.asset_id)
    {
        Some(existing) => existing.amount += event.amount,
        None => events.push(event),
    }
}

fn swap_event(input: &ClassifyInput<'_>, found: &VenueMatch) -> Option<ClassifiedEvent> {
    // Prefer the token leg over native when both decreased.
    let spent = input
        .deltas
        .iter()
        .filter(|delta| delta.raw_delta < 0)
        .min_by_key(|delta| delta.is_native())?;

    Some(ClassifiedEvent {
        event_type: EventType::Swap,
        venue: found.venue.to_string(),
        asset_id: spent.asset_id.clone(),
        amount: -spent.amount().abs(),
        counterparty_from: Some(input.wallet.to_string()),
        counterparty_to: Some(found.venue.primary_program_id().to_string()),
    })
}

fn transfer_events(input: &ClassifyInput<'_>) -> Vec<ClassifiedEvent> {
    let sending = input.tx.signer() == Some(input.wallet);
    let event_type = if sending {
        EventType::Send
    } else {
        EventType::Receive
    };

    let token_deltas: Vec<&BalanceDelta> =
        input.deltas.iter().filter(|delta| !delta.is_native()).collect();
    let moved: Vec<&BalanceDelta> = if token_deltas.is_empty() {
        input.deltas.iter().filter(|delta| delta.is_native()).collect()
    } else {
        token_deltas
    };

    moved
        .into_iter()
        .map(|delta| {
            let magnitude = delta.amount().abs();
            let counterparty = counterparty_for(input, delta);
            let (amount, from, to) = if sending {
                (-magnitude, Some(input.wallet.to_string()), counterparty)
            } else {
                (magnitude, counterparty, Some(input.wallet.to_string()))
            };
            ClassifiedEvent {
                event_type,
                venue: venue_name(None),
                asset_id: delta.asset_id.clone(),
                amount,
                counterparty_from: from,
                counterparty_to: to,
            }
        })
        .collect()
}

/// The account that moved the opposite way by the largest amount, falling
/// back to the first non-structural account key other than the wallet.
fn counterparty_for(input: &ClassifyInput<'_>, delta: &BalanceDelta) -> Option<String> {
    let tx = input.tx;
    let wallet_sign = delta.raw_delta.signum();

    let best = if delta.asset_id == NATIVE_ASSET_ID {
        tx.account_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.pubkey != input.wallet)
            .filter_map(|(index, key)| {
                let mut moved = tx.native_delta_at(index)?;
                // The fee payer's debit includes the fee.
                if index == 0 {
                    moved += i128::from(tx.fee);
                }
                Some((key.pubkey.clone(), moved))
            })
            .filter(|(_, moved)| moved.signum() == -wallet_sign && *moved != 0)
            .max_by_key(|(_, moved)| moved.abs())
    } else {
        token_deltas_by_owner(tx, &delta.asset_id)
            .into_iter()
            .filter(|(owner, moved)| owner != input.wallet && moved.signum() == -wallet_sign)
            .max_by_key(|(_, moved)| moved.abs())
    };

    best.map(|(pubkey, _)| pubkey).or_else(|| {
        tx.account_keys
            .iter()
            .map(|key| key.pubkey.as_str())
            .find(|pubkey| *pubkey != input.wallet && !STRUCTURAL_ACCOUNTS.contains(pubkey))
            .map(str::to_string)
    })
}
