//! Representatives: who the wallet's accounts delegate to, which ones the
//! node recommends, and the aliases the user has chosen to remember.

use serde::{Deserialize, Serialize};

use troll_node_client::RepresentativeWeight;
use troll_types::{AccountAddress, DecimalAmount, RawAmount};

use crate::store::AccountView;

/// Total supply in raw: 133,248,289 Mtrollar.
pub const TOTAL_SUPPLY: RawAmount = RawAmount::new(133_248_289 * 10u128.pow(30));

const PERCENT_DECIMALS: u32 = 3;

/// A representative the user has named.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownRepresentative {
    pub address: AccountAddress,
    pub alias: String,
}

/// Representatives the user has saved, in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepresentativeBook {
    entries: Vec<KnownRepresentative>,
}

impl RepresentativeBook {
    pub fn new(entries: Vec<KnownRepresentative>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[KnownRepresentative] {
        &self.entries
    }

    pub fn alias_for(&self, address: &AccountAddress) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.address.same_account(address))
            .map(|e| e.alias.as_str())
    }

    /// Save `address` under `alias`. Returns `false` if it was already known.
    pub fn remember(&mut self, address: &AccountAddress, alias: impl Into<String>) -> bool {
        if self.alias_for(address).is_some() {
            return false;
        }
        self.entries.push(KnownRepresentative {
            address: address.with_current_prefix(),
            alias: alias.into(),
        });
        true
    }
}

/// A representative from the node's weight list, ready for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedRepresentative {
    pub address: AccountAddress,
    pub alias: Option<String>,
    pub weight_raw: RawAmount,
    /// Share of the total supply, truncated to three decimals.
    pub percent: DecimalAmount,
}

/// Share of the total supply held by `weight`, in percent.
pub fn weight_percent(weight: RawAmount) -> DecimalAmount {
    // One unit of `per_milli` is 0.001% of the supply.
    let per_milli = TOTAL_SUPPLY.raw() / (100 * 10u128.pow(PERCENT_DECIMALS));
    DecimalAmount::new(weight.raw() / per_milli, PERCENT_DECIMALS)
}

/// Convert the node's weight list, heaviest first.
pub fn recommended(
    weights: &[RepresentativeWeight],
    book: &RepresentativeBook,
) -> Vec<RecommendedRepresentative> {
    let mut list: Vec<_> = weights
        .iter()
        .map(|w| RecommendedRepresentative {
            address: w.address.with_current_prefix(),
            alias: book.alias_for(&w.address).map(str::to_string),
            weight_raw: w.weight,
            percent: weight_percent(w.weight),
        })
        .collect();
    list.sort_by(|a, b| b.weight_raw.cmp(&a.weight_raw));
    list
}

/// One representative and the wallet accounts delegating to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepresentativeOverview {
    pub address: AccountAddress,
    pub alias: Option<String>,
    /// Total voting weight: the node's figure when known, otherwise the sum
    /// of the delegating accounts' balances.
    pub weight: RawAmount,
    pub accounts: Vec<AccountAddress>,
}

/// Group the wallet's opened accounts by representative, heaviest first.
pub fn overview(
    accounts: &[AccountView],
    weights: &[RepresentativeWeight],
    book: &RepresentativeBook,
) -> Vec<RepresentativeOverview> {
    let mut groups: Vec<(RepresentativeOverview, RawAmount)> = Vec::new();
    for account in accounts {
        let Some(rep) = account.state.representative.as_ref() else {
            continue;
        };
        let pos = match groups.iter().position(|(g, _)| g.address.same_account(rep)) {
            Some(pos) => pos,
            None => {
                groups.push((
                    RepresentativeOverview {
                        address: rep.with_current_prefix(),
                        alias: book.alias_for(rep).map(str::to_string),
                        weight: RawAmount::ZERO,
                        accounts: Vec::new(),
                    },
                    RawAmount::ZERO,
                ));
                groups.len() - 1
            }
        };
        let (group, local) = &mut groups[pos];
        group.accounts.push(account.address.clone());
        *local = local.saturating_add(account.state.balance);
    }

    let mut list: Vec<_> = groups
        .into_iter()
        .map(|(mut group, local)| {
            group.weight = weights
                .iter()
                .find(|w| w.address.same_account(&group.address))
                .map(|w| w.weight)
                .unwrap_or(local);
            group
        })
        .collect();
    list.sort_by(|a, b| b.weight.cmp(&a.weight));
    list
}
