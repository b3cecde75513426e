//! Signature discovery for one wallet.
//!
//! Backfill and incremental sync share one paging routine; they differ only
//! in page size, resolve chunk and whether the walk is bounded by the cursor.
//! Pages come back newest-first and are walked backwards with `before` until
//! a short page or an already-recorded signature ends the walk. Each page is
//! handed out as soon as it arrives so callers can persist it before asking
//! for the next one.

use std::collections::HashSet;
use std::sync::Arc;

use strum_macros::{AsRefStr, Display};
use tracing::debug;
use wallet_ledger_domain::config::PagingConfig;
use wallet_ledger_domain::model::{RawSignatureEntry, Wallet};
use wallet_ledger_domain::storage::EventLedger;

use crate::cursor::ResumePoint;
use crate::rpc::{LedgerProvider, SignatureQuery};
use crate::worker::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SyncMode {
    Backfill,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub mode: SyncMode,
    pub page_size: usize,
    pub resolve_chunk: usize,
    /// Exclusive upper bound of the first page; `None` starts at the head.
    pub before: Option<String>,
    /// Exclusive lower bound of the walk.
    pub until: Option<String>,
    /// Continues a walk that an earlier pass did not finish.
    pub resumed: bool,
}

impl PagePlan {
    pub fn backfill(paging: PagingConfig) -> Self {
        Self {
            mode: SyncMode::Backfill,
            page_size: paging.page_size.max(1),
            resolve_chunk: paging.resolve_chunk.max(1),
            before: None,
            until: None,
            resumed: false,
        }
    }

    pub fn incremental(paging: PagingConfig, cursor_signature: impl Into<String>) -> Self {
        Self {
            mode: SyncMode::Incremental,
            page_size: paging.page_size.max(1),
            resolve_chunk: paging.resolve_chunk.max(1),
            before: None,
            until: Some(cursor_signature.into()),
            resumed: false,
        }
    }

    /// Continues an interrupted walk at the page it was processing.
    pub fn resume(paging: PagingConfig, point: ResumePoint) -> Self {
        Self {
            mode: point.mode,
            page_size: paging.page_size.max(1),
            resolve_chunk: paging.resolve_chunk.max(1),
            before: point.before,
            until: point.until,
            resumed: true,
        }
    }

    /// The point this walk starts from, kept until the walk completes.
    pub fn start_point(&self) -> ResumePoint {
        ResumePoint {
            mode: self.mode,
            before: self.before.clone(),
            until: self.until.clone(),
        }
    }
}

/// One page of new signatures, ascending by slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePage {
    pub entries: Vec<RawSignatureEntry>,
    /// Where the walk continues; `None` once this was the last page.
    pub next_before: Option<String>,
}

pub struct SignatureFetcher<P: ?Sized> {
    provider: Arc<P>,
}

impl<P> SignatureFetcher<P>
where
    P: LedgerProvider + ?Sized,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn pages<'a>(&'a self, wallet: &'a Wallet, plan: &'a PagePlan) -> SignaturePager<'a, P> {
        SignaturePager {
            provider: self.provider.as_ref(),
            wallet,
            plan,
            before: plan.before.clone(),
            seen: HashSet::new(),
            pages: 0,
            done: false,
        }
    }
}

/// Walks a wallet's history one provider page at a time.
pub struct SignaturePager<'a, P: ?Sized> {
    provider: &'a P,
    wallet: &'a Wallet,
    plan: &'a PagePlan,
    before: Option<String>,
    seen: HashSet<String>,
    pages: usize,
    done: bool,
}

impl<'a, P> SignaturePager<'a, P>
where
    P: LedgerProvider + ?Sized,
{
    /// Fetches the next page, or `None` once the walk has ended.
    ///
    /// A walk from the head stops at the first signature the wallet already
    /// recorded. A resumed walk may cross a partially written page, so there
    /// recorded signatures are handed on and left to the persistence checks.
    pub async fn next_page<L>(&mut self, ledger: &L) -> Result<Option<SignaturePage>, MonitorError>
    where
        L: EventLedger + ?Sized,
    {
        if self.done {
            return Ok(None);
        }

        let page = self
            .provider
            .list_signatures(
                &self.wallet.address,
                SignatureQuery {
                    limit: self.plan.page_size,
                    before: self.before.clone(),
                    until: self.plan.until.clone(),
                },
            )
            .await?;
        self.pages += 1;
        let short_page = page.len() < self.plan.page_size;
        self.before = page.last().map(|entry| entry.signature.clone());

        let mut newest_first: Vec<RawSignatureEntry> = Vec::with_capacity(page.len());
        let mut reached_recorded = false;
        for entry in page {
            if !self.seen.insert(entry.signature.clone())
                || (!self.plan.resumed
                    && ledger.exists(&self.wallet.wallet_id, &entry.signature).await?)
            {
                debug!(
                    wallet_id = %self.wallet.wallet_id,
                    signature = %entry.signature,
                    "reached recorded history"
                );
                reached_recorded = true;
                break;
            }
            newest_first.push(entry);
        }

        self.done = reached_recorded || short_page || self.before.is_none();
        debug!(
            wallet_id = %self.wallet.wallet_id,
            mode = %self.plan.mode,
            page = self.pages,
            count = newest_first.len(),
            last = self.done,
            "fetched signature page"
        );

        newest_first.reverse();
        newest_first.sort_by_key(|entry| entry.slot);
        Ok(Some(SignaturePage {
            entries: newest_first,
            next_before: if self.done { None } else { self.before.clone() },
        }))
    }
}
