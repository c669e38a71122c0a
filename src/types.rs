use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// origin → destination → unit cost (£/t). A missing pair means no route.
pub type CostTable = BTreeMap<String, BTreeMap<String, f64>>;

/// A three-tier distribution network: factories supply warehouses and
/// wholesalers, warehouses forward to wholesalers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Weekly supply per factory (t/week)
    pub factories: BTreeMap<String, f64>,
    /// Weekly throughput per warehouse (t/week). `~` means unbounded.
    pub warehouses: BTreeMap<String, Option<f64>>,
    /// Weekly demand per wholesaler (t/week)
    pub wholesalers: BTreeMap<String, f64>,
    /// How many warehouses must stay open
    pub open_warehouses: u32,
    /// Routes costing at least this much are kept in the model but flagged.
    pub prohibitive_cost: Option<f64>,
    pub costs: CostTables,
    pub rent: Option<Rent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTables {
    #[serde(default)]
    pub factory_to_warehouse: CostTable,
    #[serde(default)]
    pub factory_to_wholesaler: CostTable,
    #[serde(default)]
    pub warehouse_to_wholesaler: CostTable,
}

/// Rental income earned by letting out a warehouse when it is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rent {
    pub warehouse: String,
    /// £ per 1000 t/week of capacity
    pub weekly_rate_per_kiloton: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Leg {
    FactoryToWarehouse,
    FactoryToWholesaler,
    WarehouseToWholesaler,
}

impl Leg {
    pub const ALL: [Leg; 3] = [
        Leg::FactoryToWarehouse,
        Leg::FactoryToWholesaler,
        Leg::WarehouseToWholesaler,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Leg::FactoryToWarehouse => "Factory -> Warehouse",
            Leg::FactoryToWholesaler => "Factory -> Wholesaler (direct)",
            Leg::WarehouseToWholesaler => "Warehouse -> Wholesaler",
        }
    }

    fn table_name(self) -> &'static str {
        match self {
            Leg::FactoryToWarehouse => "factory_to_warehouse",
            Leg::FactoryToWholesaler => "factory_to_wholesaler",
            Leg::WarehouseToWholesaler => "warehouse_to_wholesaler",
        }
    }
}

/// A directed arc of the network. Only routes present in a cost table exist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub leg: Leg,
    pub origin: String,
    pub destination: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.origin, self.destination)
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to parse network: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{table}: unknown {role} `{node}`")]
    UnknownNode {
        table: &'static str,
        role: &'static str,
        node: String,
    },
    #[error("{what} of `{node}` must be a finite nonnegative number (found {value})")]
    InvalidQuantity {
        what: &'static str,
        node: String,
        value: f64,
    },
    #[error("{table}: cost of {route} must be a finite nonnegative number (found {value})")]
    InvalidCost {
        table: &'static str,
        route: Route,
        value: f64,
    },
    #[error("unknown warehouse `{0}`")]
    UnknownWarehouse(String),
    #[error("warehouse `{0}` has unbounded capacity and cannot be rented out")]
    UnboundedRentWarehouse(String),
    #[error("rent rate must be a finite nonnegative number (found {0})")]
    InvalidRentRate(f64),
}

fn check_quantity(what: &'static str, node: &str, value: f64) -> Result<(), NetworkError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(NetworkError::InvalidQuantity {
            what,
            node: node.to_owned(),
            value,
        })
    }
}

impl Network {
    /// Parse and validate a network from YAML
    pub fn from_yaml(buf: &str) -> Result<Self, NetworkError> {
        let network: Network = serde_yaml::from_str(buf)?;
        network.validate()?;
        if let Some((sentinel, dearest)) = network.weak_prohibitive_cost() {
            warn!("prohibitive cost {sentinel} is close to the dearest regular route ({dearest})");
        }
        Ok(network)
    }

    pub fn table(&self, leg: Leg) -> &CostTable {
        match leg {
            Leg::FactoryToWarehouse => &self.costs.factory_to_warehouse,
            Leg::FactoryToWholesaler => &self.costs.factory_to_wholesaler,
            Leg::WarehouseToWholesaler => &self.costs.warehouse_to_wholesaler,
        }
    }

    /// Every existing route with its unit cost, in a stable order
    pub fn routes(&self) -> BTreeMap<Route, f64> {
        Leg::ALL
            .iter()
            .flat_map(|&leg| {
                self.table(leg).iter().flat_map(move |(origin, row)| {
                    row.iter().map(move |(destination, &cost)| {
                        let route = Route {
                            leg,
                            origin: origin.clone(),
                            destination: destination.clone(),
                        };
                        (route, cost)
                    })
                })
            })
            .collect()
    }

    pub fn is_prohibitive(&self, cost: f64) -> bool {
        self.prohibitive_cost.is_some_and(|sentinel| cost >= sentinel)
    }

    /// The prohibitive cost and the dearest route below it, when the
    /// prohibitive cost is less than twice that route's cost. Such a
    /// sentinel may no longer keep flow off the routes it marks.
    pub fn weak_prohibitive_cost(&self) -> Option<(f64, f64)> {
        let sentinel = self.prohibitive_cost?;
        let dearest = self
            .routes()
            .into_values()
            .filter(|&cost| cost < sentinel)
            .fold(0.0, f64::max);
        (sentinel < dearest * 2.0).then_some((sentinel, dearest))
    }

    /// Weekly rental income for the rented warehouse, if any
    pub fn rental_income(&self) -> Option<(&str, f64)> {
        let rent = self.rent.as_ref()?;
        let capacity = (*self.warehouses.get(&rent.warehouse)?)?;
        let income = rent.weekly_rate_per_kiloton * capacity / 1000.0;
        Some((rent.warehouse.as_str(), income))
    }

    /// Structural checks only. Whether demand can actually be met is left to
    /// the solver.
    pub fn validate(&self) -> Result<(), NetworkError> {
        for (name, &supply) in &self.factories {
            check_quantity("supply", name, supply)?;
        }
        for (name, capacity) in &self.warehouses {
            if let Some(capacity) = *capacity {
                check_quantity("capacity", name, capacity)?;
            }
        }
        for (name, &demand) in &self.wholesalers {
            check_quantity("demand", name, demand)?;
        }

        for leg in Leg::ALL {
            self.validate_table(leg)?;
        }

        if let Some(rent) = &self.rent {
            match self.warehouses.get(&rent.warehouse) {
                None => return Err(NetworkError::UnknownWarehouse(rent.warehouse.clone())),
                Some(None) => {
                    return Err(NetworkError::UnboundedRentWarehouse(rent.warehouse.clone()));
                }
                Some(Some(_)) => {}
            }
            let rate = rent.weekly_rate_per_kiloton;
            if !(rate.is_finite() && rate >= 0.0) {
                return Err(NetworkError::InvalidRentRate(rate));
            }
        }

        Ok(())
    }

    fn validate_table(&self, leg: Leg) -> Result<(), NetworkError> {
        let table = leg.table_name();
        let (origin_role, destination_role) = match leg {
            Leg::FactoryToWarehouse => ("factory", "warehouse"),
            Leg::FactoryToWholesaler => ("factory", "wholesaler"),
            Leg::WarehouseToWholesaler => ("warehouse", "wholesaler"),
        };

        for (origin, row) in self.table(leg) {
            let known_origin = match leg {
                Leg::WarehouseToWholesaler => self.warehouses.contains_key(origin),
                _ => self.factories.contains_key(origin),
            };
            if !known_origin {
                return Err(NetworkError::UnknownNode {
                    table,
                    role: origin_role,
                    node: origin.clone(),
                });
            }

            for (destination, &cost) in row {
                let known_destination = match leg {
                    Leg::FactoryToWarehouse => self.warehouses.contains_key(destination),
                    _ => self.wholesalers.contains_key(destination),
                };
                if !known_destination {
                    return Err(NetworkError::UnknownNode {
                        table,
                        role: destination_role,
                        node: destination.clone(),
                    });
                }
                if !(cost.is_finite() && cost >= 0.0) {
                    let route = Route {
                        leg,
                        origin: origin.clone(),
                        destination: destination.clone(),
                    };
                    return Err(NetworkError::InvalidCost {
                        table,
                        route,
                        value: cost,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
factories: { F: 100 }
warehouses: { A: 60, B: ~ }
wholesalers: { W: 80 }
open_warehouses: 1
costs:
  factory_to_warehouse: { F: { A: 1, B: 2 } }
  warehouse_to_wholesaler: { A: { W: 1 }, B: { W: 1 } }
"#;

    fn small() -> Network {
        Network::from_yaml(SMALL).unwrap()
    }

    #[test]
    fn parses_unbounded_capacity_and_missing_tables() {
        let network = small();
        assert_eq!(network.warehouses["A"], Some(60.0));
        assert_eq!(network.warehouses["B"], None);
        assert!(network.costs.factory_to_wholesaler.is_empty());
        assert!(network.rent.is_none());
    }

    #[test]
    fn routes_only_cover_listed_pairs() {
        let routes = small().routes();
        assert_eq!(routes.len(), 4);
        let key = Route {
            leg: Leg::FactoryToWarehouse,
            origin: "F".into(),
            destination: "B".into(),
        };
        assert_eq!(routes[&key], 2.0);
        assert!(routes.keys().all(|r| r.leg != Leg::FactoryToWholesaler));
    }

    #[test]
    fn rejects_unknown_destination() {
        let mut network = small();
        network
            .costs
            .warehouse_to_wholesaler
            .get_mut("A")
            .unwrap()
            .insert("Nowhere".into(), 3.0);
        match network.validate() {
            Err(NetworkError::UnknownNode { role, node, .. }) => {
                assert_eq!(role, "wholesaler");
                assert_eq!(node, "Nowhere");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_warehouse_used_as_factory() {
        let mut network = small();
        network
            .costs
            .factory_to_wholesaler
            .insert("A".into(), BTreeMap::from([("W".to_owned(), 1.0)]));
        assert!(matches!(
            network.validate(),
            Err(NetworkError::UnknownNode { role: "factory", .. })
        ));
    }

    #[test]
    fn rejects_negative_numbers() {
        let mut network = small();
        network.wholesalers.insert("W".into(), -1.0);
        assert!(matches!(
            network.validate(),
            Err(NetworkError::InvalidQuantity { what: "demand", .. })
        ));

        let mut network = small();
        network
            .costs
            .factory_to_warehouse
            .get_mut("F")
            .unwrap()
            .insert("A".into(), f64::NAN);
        assert!(matches!(
            network.validate(),
            Err(NetworkError::InvalidCost { .. })
        ));
    }

    #[test]
    fn same_name_in_different_tiers_is_accepted() {
        let network = Network::from_yaml(
            r#"
factories: { Leeds: 100 }
warehouses: { Leeds: 100 }
wholesalers: { Leeds: 50 }
open_warehouses: 1
costs:
  factory_to_warehouse: { Leeds: { Leeds: 1 } }
  warehouse_to_wholesaler: { Leeds: { Leeds: 1 } }
"#,
        )
        .unwrap();
        assert_eq!(network.routes().len(), 2);
    }

    #[test]
    fn rent_needs_a_known_bounded_warehouse() {
        let mut network = small();
        network.rent = Some(Rent {
            warehouse: "B".into(),
            weekly_rate_per_kiloton: 10.0,
        });
        assert!(matches!(
            network.validate(),
            Err(NetworkError::UnboundedRentWarehouse(_))
        ));

        network.rent = Some(Rent {
            warehouse: "Z".into(),
            weekly_rate_per_kiloton: 10.0,
        });
        assert!(matches!(
            network.validate(),
            Err(NetworkError::UnknownWarehouse(_))
        ));

        network.rent = Some(Rent {
            warehouse: "A".into(),
            weekly_rate_per_kiloton: 10.0,
        });
        network.validate().unwrap();
        assert_eq!(network.rental_income(), Some(("A", 0.6)));
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = Network::from_yaml("factories: [oops]").unwrap_err();
        assert!(matches!(err, NetworkError::Parse(_)));
    }

    #[test]
    fn weak_prohibitive_cost_threshold() {
        // Dearest regular route in `small` costs 2
        let mut network = small();
        assert_eq!(network.weak_prohibitive_cost(), None);

        network.prohibitive_cost = Some(4.0);
        assert_eq!(network.weak_prohibitive_cost(), None);

        network.prohibitive_cost = Some(3.5);
        assert_eq!(network.weak_prohibitive_cost(), Some((3.5, 2.0)));

        // Routes at or above the sentinel are not regular routes
        network.prohibitive_cost = Some(2.0);
        assert_eq!(network.weak_prohibitive_cost(), Some((2.0, 1.0)));
    }

    #[test]
    fn prohibitive_threshold() {
        let mut network = small();
        assert!(!network.is_prohibitive(1e9));
        network.prohibitive_cost = Some(500.0);
        assert!(network.is_prohibitive(500.0));
        assert!(!network.is_prohibitive(499.0));
    }
}
