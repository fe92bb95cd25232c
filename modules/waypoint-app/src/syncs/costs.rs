//! Request handling for `/CostSplitting/*`. Expenses are created by event
//! approval; callers contribute to them, remove them and read totals.

use anyhow::Result;
use waypoint_engine::{Pattern, Registry, SyncSpec, Vars};

use super::{lookup, request_to, respond};

const ADD_CONTRIBUTION: &str = "/CostSplitting/addContribution";
const REMOVE: &str = "/CostSplitting/remove";

/// Contributions are always recorded for the verified user.
pub fn add_contribution_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, expense_id, amount] = vars.many(["user", "expenseId", "amount"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, ADD_CONTRIBUTION)?
                .input("user", user)
                .input("expenseId", expense_id)
                .input("amount", amount),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("CostSplitting", "addContribution")?)
                .input("userId", user)
                .input("expenseId", expense_id)
                .input("amount", amount),
        ))
}

pub fn add_contribution_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, expense_id, amount] = vars.many(["request", "expenseId", "amount"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_CONTRIBUTION)?.output("request", request))
        .when(
            Pattern::new(reg.action("CostSplitting", "addContribution")?)
                .input("expenseId", expense_id)
                .input("amount", amount)
                .succeeded(),
        )
        .then(
            respond(reg)?
                .input("request", request)
                .input("expenseId", expense_id)
                .input("contributed", amount),
        ))
}

pub fn add_contribution_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_CONTRIBUTION)?.output("request", request))
        .when(
            Pattern::new(reg.action("CostSplitting", "addContribution")?).output("error", error),
        )
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn remove_expense_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, expense_id] = vars.many(["user", "expenseId"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, REMOVE)?.input("user", user).input("expenseId", expense_id))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(Pattern::new(reg.action("CostSplitting", "remove")?).input("expenseId", expense_id)))
}

pub fn remove_expense_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, expense_id] = vars.many(["request", "expenseId"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, REMOVE)?.output("request", request))
        .when(
            Pattern::new(reg.action("CostSplitting", "remove")?)
                .input("expenseId", expense_id)
                .succeeded(),
        )
        .then(respond(reg)?.input("request", request).input("removed", expense_id)))
}

pub fn remove_expense_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, REMOVE)?.output("request", request))
        .when(Pattern::new(reg.action("CostSplitting", "remove")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn get_expenses_by_item(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "CostSplitting", "_getExpensesByItem", "item", "expenses")
}

/// Unknown expenses are answered with `total: null`.
pub fn get_total_contributions(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "CostSplitting", "_getTotalContributions", "expenseId", "total")
}
