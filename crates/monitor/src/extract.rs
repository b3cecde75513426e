//! Per-asset balance changes for one address inside one transaction.

use std::collections::BTreeMap;

use wallet_ledger_domain::model::{
    BalanceDelta, RawTransaction, TokenBalance, NATIVE_ASSET_ID, NATIVE_DECIMALS,
};

/// Returns the non-zero balance changes of `address`: the native coin first,
/// then one entry per token mint ordered by mint.
///
/// Wrapped-native token accounts owned by `address` are folded into the
/// native entry so the ledger never sees two rows for the same asset id.
/// Missing metadata lists count as "no change".
pub fn extract_deltas(tx: &RawTransaction, address: &str) -> Vec<BalanceDelta> {
    let mut native: i128 = tx
        .account_index(address)
        .and_then(|index| tx.native_delta_at(index))
        .unwrap_or(0);

    let mut tokens = token_deltas_for_owner(tx, address);
    if let Some((wrapped, _)) = tokens.remove(NATIVE_ASSET_ID) {
        native += wrapped;
    }

    let mut deltas = Vec::with_capacity(tokens.len() + 1);
    if native != 0 {
        deltas.push(BalanceDelta {
            asset_id: NATIVE_ASSET_ID.to_string(),
            raw_delta: native,
            decimals: NATIVE_DECIMALS,
        });
    }
    deltas.extend(
        tokens
            .into_iter()
            .filter(|(_, (raw_delta, _))| *raw_delta != 0)
            .map(|(asset_id, (raw_delta, decimals))| BalanceDelta {
                asset_id,
                raw_delta,
                decimals,
            }),
    );
    deltas
}

/// Net change per mint across every token account owned by `owner`, along
/// with the mint's precision.
pub fn token_deltas_for_owner(tx: &RawTransaction, owner: &str) -> BTreeMap<String, (i128, u8)> {
    let mut totals: BTreeMap<String, (i128, u8)> = BTreeMap::new();
    accumulate(&mut totals, &tx.pre_token_balances, owner, -1);
    accumulate(&mut totals, &tx.post_token_balances, owner, 1);
    totals
}

/// Net change per owner for one mint, skipping balances without an owner.
pub fn token_deltas_by_owner(tx: &RawTransaction, mint: &str) -> BTreeMap<String, i128> {
    let mut totals: BTreeMap<String, i128> = BTreeMap::new();
    let sides = [(&tx.pre_token_balances, -1i128), (&tx.post_token_balances, 1)];
    for (balances, sign) in sides {
        for balance in balances.iter().filter(|balance| balance.mint == mint) {
            if let Some(owner) = &balance.owner {
                *totals.entry(owner.clone()).or_default() += sign * raw(balance);
            }
        }
    }
    totals
}

fn accumulate(
    totals: &mut BTreeMap<String, (i128, u8)>,
    balances: &[TokenBalance],
    owner: &str,
    sign: i128,
) {
    for balance in balances
        .iter()
        .filter(|balance| balance.owner.as_deref() == Some(owner))
    {
        let entry = totals
            .entry(balance.mint.clone())
            .or_insert((0, balance.decimals));
        entry.0 += sign * raw(balance);
        entry.1 = balance.decimals;
    }
}

fn raw(balance: &TokenBalance) -> i128 {
    i128::try_from(balance.amount).unwrap_or(i128::MAX)
}
