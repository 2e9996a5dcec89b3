//! Releases production orders into the registry when their start time comes.

use crate::config::ConfigError;
use crate::engine::SimError;
use crate::id::*;
use crate::order::{Goods, GoodsLocation, ProductionOrder};
use crate::registry::Registry;
use crate::sim::Ticks;
use crate::station::deposit;
use std::collections::HashSet;
use tracing::info;

/// Holds the input order list and tracks which orders have been released.
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    orders: Vec<ProductionOrder>,
    released: Vec<bool>,
}

impl TaskDispatcher {
    /// Validate every order and reject duplicate order numbers.
    pub fn new(orders: Vec<ProductionOrder>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for order in &orders {
            order.validate()?;
            if !seen.insert(order.order_no) {
                return Err(ConfigError::DuplicateOrder(order.order_no));
            }
        }
        let released = vec![false; orders.len()];
        Ok(Self { orders, released })
    }

    /// Every order, in input order.
    pub fn all_orders(&self) -> &[ProductionOrder] {
        &self.orders
    }

    pub fn pending(&self) -> impl Iterator<Item = &ProductionOrder> {
        self.orders
            .iter()
            .zip(&self.released)
            .filter(|(_, r)| !**r)
            .map(|(o, _)| o)
    }

    pub fn released(&self) -> impl Iterator<Item = &ProductionOrder> {
        self.orders
            .iter()
            .zip(&self.released)
            .filter(|(_, r)| **r)
            .map(|(o, _)| o)
    }

    pub fn has_pending(&self) -> bool {
        self.released.iter().any(|r| !r)
    }

    /// Latest scheduled end over all orders, released or not.
    pub fn latest_end_time(&self) -> Option<Ticks> {
        self.orders.iter().map(ProductionOrder::latest_end).max()
    }

    /// Release every pending order whose start time has passed, in input
    /// order. Each release registers the order, creates its goods and puts
    /// the goods into the origin station.
    pub fn dispatch(&mut self, reg: &mut Registry) -> Result<Vec<OrderNo>, SimError> {
        let now = reg.clock();
        let mut out = Vec::new();
        for idx in 0..self.orders.len() {
            if self.released[idx] || self.orders[idx].schedule.task_start > now {
                continue;
            }
            let order = &self.orders[idx];
            let order_no = order.order_no;
            let origin = reg.stations.key_of(&order.origin).ok_or_else(|| {
                SimError::UnknownOriginStation {
                    order: order_no,
                    station: order.origin.clone(),
                }
            })?;
            let terminal = station_key(reg, order_no, &order.terminal)?;
            for refine in [&order.lf_station, &order.rh_station].into_iter().flatten() {
                station_key(reg, order_no, refine)?;
            }

            let order_key = reg
                .orders
                .register(format!("pono_{order_no}"), order.clone())
                .ok_or(ConfigError::DuplicateOrder(order_no))?;
            let goods = Goods {
                goods_id: Goods::name_for(order_no),
                order_key,
                order_no,
                origin,
                terminal,
                variant: order.variant,
                location: GoodsLocation::Station(origin),
                ledger: Vec::new(),
            };
            let goods_key = reg
                .goods
                .register(goods.goods_id.clone(), goods)
                .ok_or(ConfigError::DuplicateOrder(order_no))?;
            if !deposit(reg, origin, goods_key) {
                return Err(SimError::UnknownStation {
                    station: self.orders[idx].origin.clone(),
                });
            }

            self.released[idx] = true;
            info!(order = %order_no, origin = %self.orders[idx].origin, "order released");
            out.push(order_no);
        }
        Ok(out)
    }
}

fn station_key(reg: &Registry, order: OrderNo, id: &str) -> Result<StationKey, SimError> {
    reg.stations
        .key_of(id)
        .ok_or_else(|| SimError::UnknownOrderStation {
            order,
            station: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn rejects_duplicate_order_numbers() {
        let orders = vec![lf_order(1, "00:00:00"), lf_order(1, "00:10:00")];
        assert!(matches!(
            TaskDispatcher::new(orders),
            Err(ConfigError::DuplicateOrder(OrderNo(1)))
        ));
    }

    #[test]
    fn releases_only_when_start_has_passed() {
        let mut reg = build_line_registry();
        let mut d =
            TaskDispatcher::new(vec![lf_order(1, "00:00:00"), lf_order(2, "00:00:30")]).unwrap();

        assert_eq!(d.dispatch(&mut reg).unwrap(), vec![OrderNo(1)]);
        assert_eq!(d.pending().count(), 1);

        reg.set_clock(20);
        assert!(d.dispatch(&mut reg).unwrap().is_empty());

        reg.set_clock(30);
        assert_eq!(d.dispatch(&mut reg).unwrap(), vec![OrderNo(2)]);
        assert!(!d.has_pending());
        assert_eq!(d.released().count(), 2);
    }

    #[test]
    fn release_creates_goods_at_origin() {
        let mut reg = build_line_registry();
        let mut d = TaskDispatcher::new(vec![lf_order(7, "00:00:00")]).unwrap();
        d.dispatch(&mut reg).unwrap();

        assert!(reg.orders.get_by_name("pono_7").is_some());
        let gk = reg.goods.key_of("goods_7").unwrap();
        let ld = reg.stations.key_of("1LD").unwrap();
        assert_eq!(reg.goods.get(gk).unwrap().location, GoodsLocation::Station(ld));
        assert_eq!(reg.stations.get(ld).unwrap().goods_for_order(OrderNo(7)), Some(gk));
        assert_eq!(reg.goods.get(gk).unwrap().ledger[0].station, "1LD");
    }

    #[test]
    fn ties_release_in_input_order() {
        let mut reg = build_line_registry();
        let mut d = TaskDispatcher::new(vec![
            lf_order(9, "00:00:00"),
            lf_order(3, "00:00:00"),
            lf_order(5, "00:00:00"),
        ])
        .unwrap();
        assert_eq!(
            d.dispatch(&mut reg).unwrap(),
            vec![OrderNo(9), OrderNo(3), OrderNo(5)]
        );
    }

    #[test]
    fn missing_origin_is_fatal() {
        let mut reg = build_line_registry();
        let mut order = lf_order(1, "00:00:00");
        order.origin = "9LD".into();
        let mut d = TaskDispatcher::new(vec![order]).unwrap();
        assert!(matches!(
            d.dispatch(&mut reg),
            Err(SimError::UnknownOriginStation { .. })
        ));
    }

    #[test]
    fn latest_end_time_covers_all_orders() {
        let d = TaskDispatcher::new(vec![lf_order(1, "00:00:00"), lf_order(2, "01:00:00")])
            .unwrap();
        assert_eq!(
            d.latest_end_time(),
            Some(d.all_orders()[1].latest_end())
        );
    }
}
