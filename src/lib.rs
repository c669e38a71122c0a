pub mod report;
pub mod types;

use good_lp::solvers::coin_cbc::{CoinCbcProblem, coin_cbc};
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    variable, variables,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use types::{CostTable, CostTables, Leg, Network, NetworkError, Rent, Route};

/// Flows at or below this many tons are solver noise
pub const FLOW_TOLERANCE: f64 = 1e-6;

/// Binary indicators above this value count as 1
pub const OPEN_THRESHOLD: f64 = 0.5;

/// Gate for warehouses without a throughput limit
pub const BIG_M: f64 = 1e6;

/// A term added to the transport cost objective.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    None,
    /// Earn `credit` if `warehouse` ends up closed
    ClosureCredit { warehouse: String, credit: f64 },
}

impl Adjustment {
    /// The rent variant described by the network, if it has one
    pub fn rental(network: &Network) -> Option<Self> {
        network
            .rental_income()
            .map(|(warehouse, credit)| Adjustment::ClosureCredit {
                warehouse: warehouse.to_owned(),
                credit,
            })
    }

    /// Names the variant in report headings
    pub fn label(&self) -> String {
        match self {
            Adjustment::None => "transport cost only".to_owned(),
            Adjustment::ClosureCredit { warehouse, .. } => format!("with {warehouse} rent"),
        }
    }

    /// What the objective value measures under this adjustment
    pub fn objective_caption(&self) -> &'static str {
        match self {
            Adjustment::None => "Minimum transport cost",
            Adjustment::ClosureCredit { .. } => "Minimum net cost (transport – rent)",
        }
    }

    fn expression(&self, open_map: &WarehouseToVariableMap) -> Result<Expression, NetworkError> {
        match self {
            Adjustment::None => Ok(Expression::from(0.0)),
            Adjustment::ClosureCredit { warehouse, credit } => {
                let open = open_map
                    .get(warehouse)
                    .ok_or_else(|| NetworkError::UnknownWarehouse(warehouse.clone()))?;
                // -credit * (1 - open)
                Ok(*open * *credit - Expression::from(*credit))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    NotSolved(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Optimal => write!(f, "Optimal"),
            Status::Infeasible => write!(f, "Infeasible"),
            Status::Unbounded => write!(f, "Unbounded"),
            Status::NotSolved(reason) => write!(f, "Not Solved ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub route: Route,
    pub unit_cost: f64,
    pub tons: f64,
    pub prohibitive: bool,
}

impl Flow {
    pub fn is_active(&self) -> bool {
        self.tons > FLOW_TOLERANCE
    }
}

/// Values read back from an optimal solve
#[derive(Debug, Clone)]
pub struct Plan {
    pub objective: f64,
    /// Raw open-indicator value per warehouse
    pub open: BTreeMap<String, f64>,
    /// Every route of the network, including unused ones
    pub flows: Vec<Flow>,
}

impl Plan {
    pub fn is_open(&self, warehouse: &str) -> bool {
        self.open
            .get(warehouse)
            .is_some_and(|&value| value > OPEN_THRESHOLD)
    }

    pub fn open_warehouses(&self) -> Vec<&str> {
        self.open
            .keys()
            .filter(|w| self.is_open(w))
            .map(String::as_str)
            .collect()
    }

    /// Flows above tolerance on one leg of the network
    pub fn shipments(&self, leg: Leg) -> impl Iterator<Item = &Flow> {
        self.flows
            .iter()
            .filter(move |flow| flow.route.leg == leg && flow.is_active())
    }

    /// Sum of unit cost × tons over all routes
    pub fn transport_cost(&self) -> f64 {
        self.flows.iter().map(|flow| flow.unit_cost * flow.tons).sum()
    }

    /// Total shipped out of `node` along one leg
    pub fn outflow(&self, leg: Leg, node: &str) -> f64 {
        self.flows
            .iter()
            .filter(|flow| flow.route.leg == leg && flow.route.origin == node)
            .map(|flow| flow.tons)
            .sum()
    }

    /// Total received by `node` along one leg
    pub fn inflow(&self, leg: Leg, node: &str) -> f64 {
        self.flows
            .iter()
            .filter(|flow| flow.route.leg == leg && flow.route.destination == node)
            .map(|flow| flow.tons)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: Status,
    /// Only present when the status is optimal
    pub plan: Option<Plan>,
}

impl Network {
    /// Minimise transport cost with exactly `open_warehouses` warehouses open
    pub fn solve(&self) -> Result<Outcome, NetworkError> {
        self.solve_with(&Adjustment::None)
    }

    /// Build a fresh model with the given objective adjustment and solve it.
    /// Infeasibility is reported through [`Outcome::status`], not as an error.
    pub fn solve_with(&self, adjustment: &Adjustment) -> Result<Outcome, NetworkError> {
        self.validate()?;

        // One variable per existing route, one indicator per warehouse
        let routes = self.routes();
        let (variables, flow_map, open_map) = init_variables(&routes, &self.warehouses);
        debug!(
            "model has {} flow variables and {} open indicators",
            flow_map.len(),
            open_map.len()
        );

        let objective = create_objective_function(&routes, &flow_map, &open_map, adjustment)?;
        let model = create_model(variables, objective.clone());

        let model = constrain_factory_supplies(model, &self.factories, &flow_map);
        let model = constrain_warehouse_balance(model, &self.warehouses, &flow_map);
        let model = constrain_warehouse_capacities(model, &self.warehouses, &flow_map, &open_map);
        let model = constrain_wholesaler_demands(model, &self.wholesalers, &flow_map);
        let model = constrain_open_count(model, self.open_warehouses, &open_map);

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(err) => {
                let status = match err {
                    ResolutionError::Infeasible => Status::Infeasible,
                    ResolutionError::Unbounded => Status::Unbounded,
                    other => Status::NotSolved(other.to_string()),
                };
                info!("solver finished without a plan: {status}");
                return Ok(Outcome { status, plan: None });
            }
        };

        let plan = create_plan(self, &solution, &objective, &routes, &flow_map, &open_map);
        info!("solved: objective {}", plan.objective);
        warn_prohibitive_flows(&plan);
        Ok(Outcome {
            status: Status::Optimal,
            plan: Some(plan),
        })
    }
}

type RouteToVariableMap = BTreeMap<Route, Variable>;
type WarehouseToVariableMap = BTreeMap<String, Variable>;

fn init_variables(
    routes: &BTreeMap<Route, f64>,
    warehouses: &BTreeMap<String, Option<f64>>,
) -> (ProblemVariables, RouteToVariableMap, WarehouseToVariableMap) {
    let mut problem_vars = variables!();

    // Tons shipped along each route
    let flow_map = routes
        .keys()
        .map(|route| (route.clone(), problem_vars.add(variable().min(0))))
        .collect();

    // 1 if the warehouse stays open
    let open_map = warehouses
        .keys()
        .map(|warehouse| (warehouse.clone(), problem_vars.add(variable().binary())))
        .collect();

    (problem_vars, flow_map, open_map)
}

fn create_objective_function(
    routes: &BTreeMap<Route, f64>,
    flow_map: &RouteToVariableMap,
    open_map: &WarehouseToVariableMap,
    adjustment: &Adjustment,
) -> Result<Expression, NetworkError> {
    let transport = routes
        .iter()
        .fold(Expression::from(0.0), |sum, (route, &unit_cost)| {
            sum + flow_map[route] * unit_cost
        });
    Ok(transport + adjustment.expression(open_map)?)
}

/// Create a silent CBC model minimising the given objective
fn create_model(variables: ProblemVariables, objective: Expression) -> CoinCbcProblem {
    let mut model = variables.minimise(objective).using(coin_cbc);
    model.set_parameter("log", "0");
    model
}

/// Sum of flow variables matching `keep`
fn sum_flows(flow_map: &RouteToVariableMap, keep: impl Fn(&Route) -> bool) -> Expression {
    flow_map
        .iter()
        .filter(|(route, _)| keep(route))
        .fold(Expression::from(0.0), |sum, (_, &flow)| sum + flow)
}

fn outbound(flow_map: &RouteToVariableMap, leg: Leg, origin: &str) -> Expression {
    sum_flows(flow_map, |route| route.leg == leg && route.origin == origin)
}

fn inbound(flow_map: &RouteToVariableMap, leg: Leg, destination: &str) -> Expression {
    sum_flows(flow_map, |route| {
        route.leg == leg && route.destination == destination
    })
}

/// A factory cannot ship more than it produces
fn constrain_factory_supplies<Model: SolverModel>(
    model: Model,
    factories: &BTreeMap<String, f64>,
    flow_map: &RouteToVariableMap,
) -> Model {
    factories.iter().fold(model, |m, (factory, &supply)| {
        let shipped = outbound(flow_map, Leg::FactoryToWarehouse, factory)
            + outbound(flow_map, Leg::FactoryToWholesaler, factory);
        m.with(shipped.leq(supply))
    })
}

/// Warehouses store nothing: what comes in goes out
fn constrain_warehouse_balance<Model: SolverModel>(
    model: Model,
    warehouses: &BTreeMap<String, Option<f64>>,
    flow_map: &RouteToVariableMap,
) -> Model {
    warehouses.keys().fold(model, |m, warehouse| {
        let inflow = inbound(flow_map, Leg::FactoryToWarehouse, warehouse);
        let outflow = outbound(flow_map, Leg::WarehouseToWholesaler, warehouse);
        m.with(constraint!(inflow == outflow))
    })
}

/// A closed warehouse ships nothing, an open one at most its capacity
fn constrain_warehouse_capacities<Model: SolverModel>(
    model: Model,
    warehouses: &BTreeMap<String, Option<f64>>,
    flow_map: &RouteToVariableMap,
    open_map: &WarehouseToVariableMap,
) -> Model {
    warehouses.iter().fold(model, |m, (warehouse, capacity)| {
        let outflow = outbound(flow_map, Leg::WarehouseToWholesaler, warehouse);
        let open = open_map[warehouse];
        let limit = capacity.unwrap_or(BIG_M);
        m.with(outflow.leq(open * limit))
    })
}

/// Every wholesaler receives at least its demand
fn constrain_wholesaler_demands<Model: SolverModel>(
    model: Model,
    wholesalers: &BTreeMap<String, f64>,
    flow_map: &RouteToVariableMap,
) -> Model {
    wholesalers.iter().fold(model, |m, (wholesaler, &demand)| {
        let received = inbound(flow_map, Leg::FactoryToWholesaler, wholesaler)
            + inbound(flow_map, Leg::WarehouseToWholesaler, wholesaler);
        m.with(received.geq(demand))
    })
}

fn constrain_open_count<Model: SolverModel>(
    model: Model,
    count: u32,
    open_map: &WarehouseToVariableMap,
) -> Model {
    let total_open = open_map
        .values()
        .fold(Expression::from(0.0), |sum, &open| sum + open);
    model.with(total_open.eq(count as f64))
}

/// Read every flow and indicator back from the solver
fn create_plan(
    network: &Network,
    solution: &impl Solution,
    objective: &Expression,
    routes: &BTreeMap<Route, f64>,
    flow_map: &RouteToVariableMap,
    open_map: &WarehouseToVariableMap,
) -> Plan {
    let flows = routes
        .iter()
        .map(|(route, &unit_cost)| Flow {
            route: route.clone(),
            unit_cost,
            tons: solution.value(flow_map[route]),
            prohibitive: network.is_prohibitive(unit_cost),
        })
        .collect();

    let open = open_map
        .iter()
        .map(|(warehouse, &var)| (warehouse.clone(), solution.value(var)))
        .collect();

    Plan {
        // The solver drops constant terms, so evaluate the full expression
        objective: objective.eval_with(solution),
        open,
        flows,
    }
}

fn warn_prohibitive_flows(plan: &Plan) {
    for flow in plan.flows.iter().filter(|f| f.prohibitive && f.is_active()) {
        warn!(
            "{} t shipped over prohibitive route {} (£{}/t)",
            flow.tons, flow.route, flow.unit_cost
        );
    }
}
