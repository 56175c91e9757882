use crate::{
    config::{Config, DEFAULT_UNCATEGORIZED},
    model::{GroupId, Instance, Kind, Obligation, WalletId},
    reconcile::{self, InstanceView},
};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Settlement status selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    All,
    Settled,
    Pending,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::All
    }
}

/// Criteria for narrowing a set of obligations or instances.
///
/// Each criterion is optional and they combine with AND. An unset criterion, or one set to
/// "all", never excludes anything. Deserialised criteria go through the same builders as
/// programmatic ones.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CriteriaFields")]
pub struct FilterCriteria {
    q: Option<String>,
    wallet_id: Option<WalletId>,
    group_id: Option<GroupId>,
    user_id: Option<String>,
    category: Option<String>,
    kind: Option<Kind>,
    status: StatusFilter,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

// Criteria as they arrive over the wire, before normalisation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CriteriaFields {
    q: Option<String>,
    wallet_id: Option<String>,
    group_id: Option<String>,
    user_id: Option<String>,
    category: Option<String>,
    kind: Option<Kind>,
    status: StatusFilter,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl From<CriteriaFields> for FilterCriteria {
    fn from(fields: CriteriaFields) -> Self {
        let mut criteria = FilterCriteria::default();
        criteria
            .with_query(fields.q.unwrap_or_default())
            .with_wallet(fields.wallet_id.unwrap_or_default())
            .with_group(fields.group_id.unwrap_or_default())
            .with_user(fields.user_id.unwrap_or_default())
            .with_category(fields.category.unwrap_or_default())
            .with_kind(fields.kind)
            .with_status(fields.status)
            .with_range(fields.from, fields.to);
        criteria
    }
}

/// Names used when matching, besides the fields of the items themselves
#[derive(Debug, Clone)]
pub struct DisplayNames {
    pub wallets: HashMap<WalletId, String>,
    pub groups: HashMap<GroupId, String>,
    /// Category that blank categories are reported and selected as
    pub uncategorized_label: String,
}

impl Default for DisplayNames {
    fn default() -> Self {
        DisplayNames {
            wallets: HashMap::new(),
            groups: HashMap::new(),
            uncategorized_label: DEFAULT_UNCATEGORIZED.into(),
        }
    }
}

impl DisplayNames {
    pub fn for_config(config: &Config) -> Self {
        DisplayNames {
            uncategorized_label: config.uncategorized_label.clone(),
            ..DisplayNames::default()
        }
    }
}

/// Anything the `FilterCriteria` can be applied to
pub trait Filterable {
    /// Free text fields searched by `q`, besides wallet and group names
    fn search_fields(&self) -> Vec<&str>;
    fn wallet_id(&self) -> &str;
    fn group_id(&self) -> Option<&str>;
    fn user_id(&self) -> &str;
    fn category(&self) -> &str;
    fn kind(&self) -> Kind;
    /// The date compared against the `from`/`to` range
    fn date(&self) -> NaiveDate;
    fn is_settled(&self) -> bool;
}

/// An obligation paired with its derived settlement status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObligationRow<'a> {
    pub obligation: &'a Obligation,
    pub settled: bool,
}

// A select value of "all" (or nothing at all) means no selection
fn selected<S: Into<String>>(value: S) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

impl FilterCriteria {
    pub fn with_query<S: Into<String>>(&mut self, q: S) -> &mut Self {
        let q = q.into();
        self.q = if q.trim().is_empty() {
            None
        } else {
            Some(q.trim().to_lowercase())
        };
        self
    }

    pub fn with_wallet<S: Into<String>>(&mut self, wallet_id: S) -> &mut Self {
        self.wallet_id = selected(wallet_id);
        self
    }

    pub fn with_group<S: Into<String>>(&mut self, group_id: S) -> &mut Self {
        self.group_id = selected(group_id);
        self
    }

    pub fn with_user<S: Into<String>>(&mut self, user_id: S) -> &mut Self {
        self.user_id = selected(user_id);
        self
    }

    pub fn with_category<S: Into<String>>(&mut self, category: S) -> &mut Self {
        self.category = selected(category);
        self
    }

    pub fn with_kind(&mut self, kind: Option<Kind>) -> &mut Self {
        self.kind = kind;
        self
    }

    pub fn with_status(&mut self, status: StatusFilter) -> &mut Self {
        self.status = status;
        self
    }

    pub fn with_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> &mut Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Test whether `item` passes every criterion
    pub fn matches<T: Filterable>(&self, item: &T, names: &DisplayNames) -> bool {
        if let Some(ref q) = self.q {
            let mut haystack = item.search_fields().join(" ");
            if let Some(name) = names.wallets.get(item.wallet_id()) {
                haystack.push(' ');
                haystack.push_str(name);
            }
            if let Some(name) = item.group_id().and_then(|g| names.groups.get(g)) {
                haystack.push(' ');
                haystack.push_str(name);
            }
            if !haystack.to_lowercase().contains(q.as_str()) {
                return false;
            }
        }

        if let Some(ref wallet) = self.wallet_id {
            if item.wallet_id() != wallet {
                return false;
            }
        }
        if let Some(ref group) = self.group_id {
            if item.group_id() != Some(group.as_str()) {
                return false;
            }
        }
        if let Some(ref user) = self.user_id {
            if item.user_id() != user {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            let own = match item.category().trim() {
                "" => names.uncategorized_label.as_str(),
                c => c,
            };
            if own != category {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if item.kind() != kind {
                return false;
            }
        }

        match self.status {
            StatusFilter::All => {}
            StatusFilter::Settled if !item.is_settled() => return false,
            StatusFilter::Pending if item.is_settled() => return false,
            _ => {}
        }

        let date = item.date();
        if self.from.map_or(false, |from| date < from) || self.to.map_or(false, |to| date > to)
        {
            return false;
        }

        true
    }
}

/// Keep the items that match `criteria`, in their original order.
pub fn filter<T: Filterable + Clone>(
    items: &[T],
    criteria: &FilterCriteria,
    names: &DisplayNames,
) -> Vec<T> {
    let kept: Vec<T> = items
        .iter()
        .filter(|item| criteria.matches(*item, names))
        .cloned()
        .collect();

    debug!("filter kept {} of {} items", kept.len(), items.len());

    kept
}

/// Filter obligations, deriving each obligation's status from `instances`.
pub fn filter_obligations(
    obligations: &[Obligation],
    instances: &[Instance],
    criteria: &FilterCriteria,
    names: &DisplayNames,
) -> Vec<Obligation> {
    let rows: Vec<ObligationRow> = obligations
        .iter()
        .map(|obligation| ObligationRow {
            obligation,
            settled: reconcile::obligation_settled(obligation, instances),
        })
        .collect();

    filter(&rows, criteria, names)
        .into_iter()
        .map(|row| row.obligation.clone())
        .collect()
}

impl Filterable for ObligationRow<'_> {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.obligation.title.as_str(), self.obligation.category.as_str()]
    }

    fn wallet_id(&self) -> &str {
        &self.obligation.wallet_id
    }

    fn group_id(&self) -> Option<&str> {
        self.obligation.group_id.as_deref()
    }

    fn user_id(&self) -> &str {
        &self.obligation.owner_id
    }

    fn category(&self) -> &str {
        &self.obligation.category
    }

    fn kind(&self) -> Kind {
        self.obligation.kind
    }

    fn date(&self) -> NaiveDate {
        self.obligation.start_date
    }

    fn is_settled(&self) -> bool {
        self.settled
    }
}

impl Filterable for InstanceView<'_> {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.obligation.title.as_str(), self.obligation.category.as_str()]
    }

    fn wallet_id(&self) -> &str {
        &self.obligation.wallet_id
    }

    fn group_id(&self) -> Option<&str> {
        self.obligation.group_id.as_deref()
    }

    fn user_id(&self) -> &str {
        &self.obligation.owner_id
    }

    fn category(&self) -> &str {
        &self.obligation.category
    }

    fn kind(&self) -> Kind {
        self.obligation.kind
    }

    fn date(&self) -> NaiveDate {
        self.instance.due_date
    }

    fn is_settled(&self) -> bool {
        reconcile::is_settled(self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{date, obligation};
    use crate::money::Money;

    fn fixtures() -> (Vec<Obligation>, Vec<Instance>) {
        let mut rent = obligation(1, Kind::Expense, 900);
        rent.title = "Rent".into();
        rent.category = "Housing".into();
        rent.group_id = Some("flat".into());

        let mut salary = obligation(2, Kind::Earning, 3000);
        salary.title = "Salary".into();
        salary.category = "Work".into();
        salary.wallet_id = "savings".into();
        salary.owner_id = "bob".into();
        salary.start_date = date(2021, 3, 1);

        let mut paid = Instance::new(1, 1, date(2021, 1, 1), Money::from_cents(30000));
        paid.settled_amount = paid.expected_amount;
        let open = Instance::new(2, 2, date(2021, 3, 1), Money::from_cents(100000));

        (vec![rent, salary], vec![paid, open])
    }

    #[test]
    fn empty_criteria_keeps_everything() {
        let (obligations, instances) = fixtures();
        let kept = filter_obligations(
            &obligations,
            &instances,
            &FilterCriteria::default(),
            &DisplayNames::default(),
        );
        assert_eq!(kept, obligations);
    }

    #[test]
    fn all_never_excludes() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria
            .with_wallet("all")
            .with_group("ALL")
            .with_category("")
            .with_user(" all ");
        assert_eq!(criteria, FilterCriteria::default());
        assert_eq!(
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default())
                .len(),
            2
        );
    }

    #[test]
    fn free_text_is_case_insensitive() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria.with_query("hous");
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn free_text_searches_display_names() {
        let (obligations, instances) = fixtures();
        let mut names = DisplayNames::default();
        names.wallets.insert("savings".into(), "Rainy Day".into());
        names.groups.insert("flat".into(), "Shared Flat".into());

        let mut criteria = FilterCriteria::default();
        criteria.with_query("rainy");
        let kept = filter_obligations(&obligations, &instances, &criteria, &names);
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);

        criteria.with_query("SHARED");
        let kept = filter_obligations(&obligations, &instances, &criteria, &names);
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn exact_match_selects_combine() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria.with_wallet("savings").with_kind(Some(Kind::Earning));
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);

        criteria.with_user("alice");
        assert!(
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default())
                .is_empty()
        );
    }

    #[test]
    fn group_and_category() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria.with_group("flat").with_category("Housing");
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn status_filter() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria.with_status(StatusFilter::Settled);
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);

        criteria.with_status(StatusFilter::Pending);
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn date_range_is_inclusive() {
        let (obligations, instances) = fixtures();
        let views = reconcile::join(&obligations, &instances);
        let mut criteria = FilterCriteria::default();
        criteria.with_range(Some(date(2021, 1, 1)), Some(date(2021, 1, 1)));
        let kept = filter(&views, &criteria, &DisplayNames::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].instance.id, 1);

        criteria.with_range(Some(date(2021, 1, 2)), None);
        let kept = filter(&views, &criteria, &DisplayNames::default());
        assert_eq!(kept[0].instance.id, 2);
    }

    #[test]
    fn filtering_is_idempotent() {
        let (obligations, instances) = fixtures();
        let views = reconcile::join(&obligations, &instances);
        let names = DisplayNames::default();
        let mut criteria = FilterCriteria::default();
        criteria.with_query("a").with_status(StatusFilter::Pending);

        let once = filter(&views, &criteria, &names);
        let twice = filter(&once, &criteria, &names);
        assert_eq!(once, twice);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let (obligations, instances) = fixtures();
        let mut criteria = FilterCriteria::default();
        criteria.with_query("nothing like this");
        assert!(
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default())
                .is_empty()
        );
    }

    #[test]
    fn criteria_from_json() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"walletId":"main","status":"pending","from":"2021-01-01"}"#)
                .unwrap();
        let mut expected = FilterCriteria::default();
        expected
            .with_wallet("main")
            .with_status(StatusFilter::Pending)
            .with_range(Some(date(2021, 1, 1)), None);
        assert_eq!(criteria, expected);
    }

    #[test]
    fn json_criteria_are_normalised() {
        let (obligations, instances) = fixtures();
        let names = DisplayNames::default();

        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"walletId":"all","groupId":" ALL ","status":"all"}"#)
                .unwrap();
        assert_eq!(criteria, FilterCriteria::default());
        assert_eq!(
            filter_obligations(&obligations, &instances, &criteria, &names).len(),
            2
        );

        let criteria: FilterCriteria = serde_json::from_str(r#"{"q":"RENT"}"#).unwrap();
        let kept = filter_obligations(&obligations, &instances, &criteria, &names);
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn uncategorized_can_be_selected() {
        let (mut obligations, instances) = fixtures();
        obligations[1].category = "  ".into();

        let mut criteria = FilterCriteria::default();
        criteria.with_category("uncategorized");
        let kept =
            filter_obligations(&obligations, &instances, &criteria, &DisplayNames::default());
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);

        let mut config = Config::default();
        config.uncategorized_label = "Other".into();
        criteria.with_category("Other");
        let kept = filter_obligations(
            &obligations,
            &instances,
            &criteria,
            &DisplayNames::for_config(&config),
        );
        assert_eq!(kept.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);
    }
}
