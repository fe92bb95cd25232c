use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use waypoint_engine::{ActionSpec, Concept, Payload};

use super::{doc, error, fresh_id, lock, number, object, ok, text};

pub const NAME: &str = "CostSplitting";

#[derive(Debug, Clone, Serialize)]
struct Expense {
    #[serde(rename = "_id")]
    id: String,
    item: String,
    cost: f64,
    /// user → amount
    contributions: BTreeMap<String, f64>,
}

impl Expense {
    fn covered(&self) -> f64 {
        self.contributions.values().sum()
    }
}

/// Expenses attached to an item and the contributions that cover them.
#[derive(Default)]
pub struct CostSplitting {
    expenses: Mutex<BTreeMap<String, Expense>>,
}

impl CostSplitting {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, input: &Payload) -> Payload {
        let Some(item) = text(input, "item") else {
            return error("item is required.");
        };
        let Some(cost) = number(input, "cost").filter(|c| *c > 0.0) else {
            return error("Expense cost must be a positive number.");
        };
        let id = fresh_id();
        lock(&self.expenses).insert(
            id.clone(),
            Expense {
                id: id.clone(),
                item: item.to_string(),
                cost,
                contributions: BTreeMap::new(),
            },
        );
        object(json!({ "expenseId": id }))
    }

    fn remove(&self, input: &Payload) -> Payload {
        let Some(id) = text(input, "expenseId") else {
            return error("expenseId is required.");
        };
        match lock(&self.expenses).remove(id) {
            Some(_) => ok(),
            None => error(format!("Expense with ID '{id}' not found.")),
        }
    }

    fn add_contribution(&self, input: &Payload) -> Payload {
        let (Some(user), Some(id)) = (text(input, "userId"), text(input, "expenseId")) else {
            return error("userId and expenseId are required.");
        };
        let Some(amount) = number(input, "amount").filter(|a| *a > 0.0) else {
            return error("Contribution amount must be a positive number.");
        };
        let mut expenses = lock(&self.expenses);
        let Some(expense) = expenses.get_mut(id) else {
            return error(format!("Expense with ID '{id}' not found."));
        };
        if expense.covered() + amount > expense.cost {
            return error(format!(
                "Contribution of {amount} exceeds the remaining {} of this expense.",
                expense.cost - expense.covered()
            ));
        }
        *expense.contributions.entry(user.to_string()).or_insert(0.0) += amount;
        ok()
    }

    fn expenses_by_item(&self, input: &Payload) -> Result<Vec<Payload>> {
        let item = text(input, "item").unwrap_or_default();
        let expenses = lock(&self.expenses)
            .values()
            .filter(|e| e.item == item)
            .map(doc)
            .collect::<Result<Vec<_>>>()?;
        Ok(vec![object(json!({ "expenses": expenses }))])
    }

    fn total_contributions(&self, input: &Payload) -> Vec<Payload> {
        let expenses = lock(&self.expenses);
        text(input, "expenseId")
            .and_then(|id| expenses.get(id))
            .map(|e| vec![object(json!({ "total": e.covered() }))])
            .unwrap_or_default()
    }
}

#[async_trait]
impl Concept for CostSplitting {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create").input(["item", "cost"]).output(["expenseId"]),
            ActionSpec::action("remove").input(["expenseId"]),
            ActionSpec::action("addContribution").input(["userId", "expenseId", "amount"]),
            ActionSpec::query("_getExpensesByItem").input(["item"]).output(["expenses"]),
            ActionSpec::query("_getTotalContributions")
                .input(["expenseId"])
                .output(["total"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        Ok(match action {
            "create" => self.create(&input),
            "remove" => self.remove(&input),
            "addContribution" => self.add_contribution(&input),
            other => anyhow::bail!("{NAME} has no action {other}"),
        })
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        match query {
            "_getExpensesByItem" => self.expenses_by_item(&input),
            "_getTotalContributions" => Ok(self.total_contributions(&input)),
            other => anyhow::bail!("{NAME} has no query {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn p(value: Value) -> Payload {
        object(value)
    }

    #[test]
    fn contributions_cannot_exceed_cost() {
        let costs = CostSplitting::new();
        let id = costs.create(&p(json!({"item": "dinner", "cost": 60})))["expenseId"].clone();

        assert!(costs
            .add_contribution(&p(json!({"userId": "ana", "expenseId": id, "amount": 40})))
            .is_empty());
        assert!(costs
            .add_contribution(&p(json!({"userId": "ben", "expenseId": id, "amount": 30})))
            .contains_key("error"));
        assert_eq!(
            costs.total_contributions(&p(json!({"expenseId": id})))[0]["total"],
            json!(40.0)
        );
    }

    #[test]
    fn cost_must_be_positive() {
        let costs = CostSplitting::new();
        assert!(costs.create(&p(json!({"item": "x", "cost": 0}))).contains_key("error"));
        assert!(costs.create(&p(json!({"item": "x"}))).contains_key("error"));
    }
}
