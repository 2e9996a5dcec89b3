//! Workstations: converters, refining furnaces, hand-off points and casters.
//!
//! A workstation is a goods container keyed by order number. Behaviour that
//! differs per role (ledger keeping, consuming delivered goods) is looked up
//! in a static [`RolePolicy`] table instead of being spread over types.

use crate::id::*;
use crate::order::GoodsLocation;
use crate::registry::Registry;
use crate::sim::Ticks;
use crate::track::Position;
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// What a workstation does in the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationRole {
    /// Converter; goods enter the system here.
    Origin,
    /// Refining furnace (LF or RH).
    Processing,
    /// Hand-off point between two tracks.
    Interaction,
    /// Caster; goods leave the system here.
    Terminal,
}

/// Per-role behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    /// Station keeps its own arrival/departure ledger.
    pub keeps_ledger: bool,
    /// Visits are written to the goods' own ledger.
    pub records_goods_visits: bool,
    /// Goods arriving here are removed from the live registry.
    pub consumes_deliveries: bool,
}

const ORIGIN_POLICY: RolePolicy = RolePolicy {
    keeps_ledger: false,
    records_goods_visits: true,
    consumes_deliveries: false,
};
const PROCESSING_POLICY: RolePolicy = RolePolicy {
    keeps_ledger: true,
    records_goods_visits: true,
    consumes_deliveries: false,
};
const INTERACTION_POLICY: RolePolicy = RolePolicy {
    keeps_ledger: false,
    records_goods_visits: false,
    consumes_deliveries: false,
};
const TERMINAL_POLICY: RolePolicy = RolePolicy {
    keeps_ledger: false,
    records_goods_visits: true,
    consumes_deliveries: true,
};

impl StationRole {
    pub fn policy(self) -> &'static RolePolicy {
        match self {
            StationRole::Origin => &ORIGIN_POLICY,
            StationRole::Processing => &PROCESSING_POLICY,
            StationRole::Interaction => &INTERACTION_POLICY,
            StationRole::Terminal => &TERMINAL_POLICY,
        }
    }

    /// Resolve the effective role of a station. Stations declared (or
    /// defaulted) as processing are reclassified by their plant id: ids
    /// containing `LD` are converters, ids containing `CC` are casters.
    pub fn resolve(declared: Option<StationRole>, id: &str) -> StationRole {
        match declared {
            Some(StationRole::Processing) | None => {
                if id.contains("LD") {
                    StationRole::Origin
                } else if id.contains("CC") {
                    StationRole::Terminal
                } else {
                    StationRole::Processing
                }
            }
            Some(role) => role,
        }
    }
}

// ---------------------------------------------------------------------------
// Workstation
// ---------------------------------------------------------------------------

/// A goods item resting at a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held {
    pub goods: GoodsKey,
    pub order_no: OrderNo,
}

/// Station-side record of one goods visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub order_no: OrderNo,
    pub arrived_at: Ticks,
    pub departed_at: Option<Ticks>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workstation {
    pub id: String,
    pub position: Position,
    pub role: StationRole,
    /// Tracks touching this station, in configuration order.
    pub connected_tracks: Vec<TrackKey>,
    /// Goods currently here, in arrival order.
    pub goods: Vec<Held>,
    pub ledger: Option<Vec<LedgerEntry>>,
}

impl Workstation {
    pub fn new(id: impl Into<String>, position: Position, role: StationRole) -> Self {
        Self {
            id: id.into(),
            position,
            role,
            connected_tracks: Vec::new(),
            goods: Vec::new(),
            ledger: role.policy().keeps_ledger.then(Vec::new),
        }
    }

    pub fn has_goods(&self) -> bool {
        !self.goods.is_empty()
    }

    pub fn is_free(&self) -> bool {
        self.goods.is_empty()
    }

    /// Look up the goods of an order without removing it.
    pub fn goods_for_order(&self, order_no: OrderNo) -> Option<GoodsKey> {
        self.goods
            .iter()
            .find(|h| h.order_no == order_no)
            .map(|h| h.goods)
    }

    /// Append a goods item, recording the arrival if this station keeps a ledger.
    pub fn add(&mut self, goods: GoodsKey, order_no: OrderNo, at: Ticks) {
        self.goods.push(Held { goods, order_no });
        if let Some(ledger) = &mut self.ledger {
            ledger.push(LedgerEntry {
                order_no,
                arrived_at: at,
                departed_at: None,
            });
        }
    }

    /// Remove a goods item. Returns false if it was not here.
    pub fn remove(&mut self, goods: GoodsKey, at: Ticks) -> bool {
        let Some(idx) = self.goods.iter().position(|h| h.goods == goods) else {
            return false;
        };
        let held = self.goods.remove(idx);
        let open = self.ledger.as_mut().and_then(|ledger| {
            ledger
                .iter_mut()
                .rev()
                .find(|e| e.order_no == held.order_no && e.departed_at.is_none())
        });
        if let Some(entry) = open {
            entry.departed_at = Some(at);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Registry-level operations
// ---------------------------------------------------------------------------

/// Put a goods item into a station, updating its location and ledger.
/// Returns false if either key is unknown.
pub fn deposit(reg: &mut Registry, station: StationKey, goods: GoodsKey) -> bool {
    let now = reg.clock();
    let (Some(ws), Some(g)) = (reg.stations.get_mut(station), reg.goods.get_mut(goods)) else {
        return false;
    };
    ws.add(goods, g.order_no, now);
    g.location = GoodsLocation::Station(station);
    if ws.role.policy().records_goods_visits {
        g.record_arrival(&ws.id, now);
    }
    true
}

/// Take a goods item out of a station, closing its ledger visit.
/// Returns false if the goods was not at the station.
pub fn withdraw(reg: &mut Registry, station: StationKey, goods: GoodsKey) -> bool {
    let now = reg.clock();
    let (Some(ws), Some(g)) = (reg.stations.get_mut(station), reg.goods.get_mut(goods)) else {
        return false;
    };
    if !ws.remove(goods, now) {
        return false;
    }
    if ws.role.policy().records_goods_visits {
        g.record_departure(&ws.id, now);
    }
    true
}

/// Per-tick station update. Terminal stations hand the goods bound for them
/// to the delivered archive; goods in transit to another caster stay put.
/// Returns how many goods were delivered.
pub fn update_station(reg: &mut Registry, key: StationKey) -> usize {
    let now = reg.clock();
    let Some(ws) = reg.stations.get(key) else {
        return 0;
    };
    if !ws.role.policy().consumes_deliveries || ws.goods.is_empty() {
        return 0;
    }
    let station_id = ws.id.clone();
    let arrived: Vec<Held> = ws
        .goods
        .iter()
        .copied()
        .filter(|h| reg.goods.get(h.goods).is_some_and(|g| g.terminal == key))
        .collect();

    let mut delivered = 0;
    for h in arrived {
        if let Some(ws) = reg.stations.get_mut(key) {
            ws.goods.retain(|held| held.goods != h.goods);
        }
        if let Some(g) = reg.goods.get_mut(h.goods) {
            g.record_departure(&station_id, now);
        }
        if reg.deliver(h.goods, key) {
            info!(order = %h.order_no, station = %station_id, "goods delivered");
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Goods, RefineVariant};
    use slotmap::SlotMap;

    fn goods_keys(n: usize) -> Vec<GoodsKey> {
        let mut sm: SlotMap<GoodsKey, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    #[test]
    fn role_resolution_by_id() {
        assert_eq!(StationRole::resolve(None, "1LD"), StationRole::Origin);
        assert_eq!(StationRole::resolve(None, "2CC"), StationRole::Terminal);
        assert_eq!(StationRole::resolve(None, "1LF"), StationRole::Processing);
        assert_eq!(
            StationRole::resolve(Some(StationRole::Processing), "1CC"),
            StationRole::Terminal
        );
        assert_eq!(
            StationRole::resolve(Some(StationRole::Interaction), "X1"),
            StationRole::Interaction
        );
    }

    #[test]
    fn policy_table() {
        assert!(StationRole::Processing.policy().keeps_ledger);
        assert!(!StationRole::Origin.policy().keeps_ledger);
        assert!(!StationRole::Interaction.policy().records_goods_visits);
        assert!(StationRole::Terminal.policy().consumes_deliveries);
    }

    #[test]
    fn container_add_lookup_remove() {
        let keys = goods_keys(2);
        let mut ws = Workstation::new("1LF", Position::new(5, 0), StationRole::Processing);
        assert!(ws.is_free());
        ws.add(keys[0], OrderNo(1), 100);
        ws.add(keys[1], OrderNo(2), 110);
        assert!(ws.has_goods());
        assert_eq!(ws.goods_for_order(OrderNo(2)), Some(keys[1]));
        assert_eq!(ws.goods.len(), 2);

        assert!(ws.remove(keys[0], 200));
        assert!(!ws.remove(keys[0], 210));
        let ledger = ws.ledger.as_ref().unwrap();
        assert_eq!(ledger[0].departed_at, Some(200));
        assert_eq!(ledger[1].departed_at, None);
    }

    #[test]
    fn origin_station_keeps_no_ledger() {
        let keys = goods_keys(1);
        let mut ws = Workstation::new("1LD", Position::new(0, 0), StationRole::Origin);
        ws.add(keys[0], OrderNo(1), 0);
        assert!(ws.ledger.is_none());
    }

    #[test]
    fn terminal_keeps_goods_bound_for_another_caster() {
        let mut reg = Registry::new();
        let add_caster = |reg: &mut Registry, id: &str, x: i32| {
            reg.stations
                .register(id, Workstation::new(id, Position::new(x, 0), StationRole::Terminal))
                .unwrap()
        };
        let cc1 = add_caster(&mut reg, "1CC", 9);
        let cc2 = add_caster(&mut reg, "2CC", 4);
        let mut orders: SlotMap<OrderKey, ()> = SlotMap::with_key();
        let g = reg
            .goods
            .register(
                "goods_1",
                Goods {
                    goods_id: "goods_1".into(),
                    order_key: orders.insert(()),
                    order_no: OrderNo(1),
                    origin: cc2,
                    terminal: cc1,
                    variant: RefineVariant::Lf,
                    location: GoodsLocation::Station(cc2),
                    ledger: Vec::new(),
                },
            )
            .unwrap();
        assert!(deposit(&mut reg, cc2, g));

        assert_eq!(update_station(&mut reg, cc2), 0);
        assert!(reg.delivered().is_empty());
        assert_eq!(reg.stations.get(cc2).unwrap().goods_for_order(OrderNo(1)), Some(g));
        assert_eq!(reg.goods.get(g).unwrap().ledger[0].departed_at, None);
    }

    #[test]
    fn terminal_update_delivers_goods() {
        let mut reg = Registry::new();
        let cc = reg
            .stations
            .register("1CC", Workstation::new("1CC", Position::new(9, 0), StationRole::Terminal))
            .unwrap();
        let mut orders: SlotMap<OrderKey, ()> = SlotMap::with_key();
        let g = reg
            .goods
            .register(
                "goods_1",
                Goods {
                    goods_id: "goods_1".into(),
                    order_key: orders.insert(()),
                    order_no: OrderNo(1),
                    origin: cc,
                    terminal: cc,
                    variant: RefineVariant::Lf,
                    location: GoodsLocation::Station(cc),
                    ledger: Vec::new(),
                },
            )
            .unwrap();
        reg.set_clock(500);
        assert!(deposit(&mut reg, cc, g));
        assert_eq!(update_station(&mut reg, cc), 1);
        assert!(reg.goods.is_empty());
        assert!(reg.stations.get(cc).unwrap().is_free());
        let delivered = &reg.delivered()[0];
        assert_eq!(delivered.location, GoodsLocation::Delivered(cc));
        assert_eq!(delivered.ledger[0].arrived_at, 500);
    }
}
