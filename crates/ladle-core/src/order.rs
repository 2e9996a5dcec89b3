//! Production orders and the goods they move.
//!
//! An order is immutable input apart from its [`StageProgress`], which the
//! scanner fills in as legs complete. Orders are never removed from the
//! registry so they remain available for reporting.

use crate::id::*;
use crate::sim::Ticks;
use crate::task::LegKind;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Refining variant
// ---------------------------------------------------------------------------

/// Which refining stations an order passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefineVariant {
    #[serde(rename = "LF", alias = "Lf")]
    Lf,
    #[serde(rename = "RH", alias = "Rh")]
    Rh,
    #[serde(rename = "LF+RH", alias = "LfRh")]
    LfRh,
}

impl RefineVariant {
    /// The ordered leg template for this variant.
    pub fn legs(self) -> &'static [LegKind] {
        match self {
            RefineVariant::Lf => &[LegKind::LdToLf, LegKind::LfToCc],
            RefineVariant::Rh => &[LegKind::LdToRh, LegKind::RhToCc],
            RefineVariant::LfRh => &[LegKind::LdToLf, LegKind::LfToRh, LegKind::RhToCc],
        }
    }

    pub fn uses_lf(self) -> bool {
        matches!(self, RefineVariant::Lf | RefineVariant::LfRh)
    }

    pub fn uses_rh(self) -> bool {
        matches!(self, RefineVariant::Rh | RefineVariant::LfRh)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefineVariant::Lf => "LF",
            RefineVariant::Rh => "RH",
            RefineVariant::LfRh => "LF+RH",
        }
    }
}

impl std::fmt::Display for RefineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Schedule, durations, progress
// ---------------------------------------------------------------------------

/// Per-stage target times, in seconds since the base day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSchedule {
    pub task_start: Ticks,
    pub task_end: Ticks,
    pub lf_start: Option<Ticks>,
    pub lf_end: Option<Ticks>,
    pub rh_start: Option<Ticks>,
    pub rh_end: Option<Ticks>,
}

/// Nominal transit and processing durations, in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegDurations {
    pub ld_to_lf: Option<u32>,
    pub ld_to_rh: Option<u32>,
    pub lf_to_rh: Option<u32>,
    pub lf_to_cc: Option<u32>,
    pub rh_to_cc: Option<u32>,
    pub lf_process: Option<u32>,
    pub rh_process: Option<u32>,
}

impl LegDurations {
    /// Nominal transit minutes for a leg kind, zero when unspecified.
    pub fn for_leg(&self, kind: LegKind) -> u32 {
        let m = match kind {
            LegKind::LdToLf => self.ld_to_lf,
            LegKind::LdToRh => self.ld_to_rh,
            LegKind::LfToRh => self.lf_to_rh,
            LegKind::LfToCc => self.lf_to_cc,
            LegKind::RhToCc => self.rh_to_cc,
        };
        m.unwrap_or(0)
    }
}

/// Actual arrivals and completion flags, written by the scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub lf_arrival: Option<Ticks>,
    pub rh_arrival: Option<Ticks>,
    pub cc_arrival: Option<Ticks>,
    pub lf_completed: bool,
    pub rh_completed: bool,
    pub all_completed: bool,
}

// ---------------------------------------------------------------------------
// Production order
// ---------------------------------------------------------------------------

/// Errors from validating a production order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order {order}: variant {variant} needs an {family} station")]
    MissingStation {
        order: OrderNo,
        variant: RefineVariant,
        family: &'static str,
    },
    #[error("order {order}: variant {variant} needs a {stage} time")]
    MissingStageTime {
        order: OrderNo,
        variant: RefineVariant,
        stage: &'static str,
    },
    #[error("order {order}: task ends before it starts")]
    EndBeforeStart { order: OrderNo },
}

/// One transport order for a single ladle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub order_no: OrderNo,
    /// Origin (converter) station id.
    pub origin: String,
    /// Terminal (caster) station id.
    pub terminal: String,
    pub variant: RefineVariant,
    pub lf_station: Option<String>,
    pub rh_station: Option<String>,
    pub schedule: StageSchedule,
    pub durations: LegDurations,
    #[serde(default)]
    pub progress: StageProgress,
}

impl ProductionOrder {
    /// Check that the variant has every station and stage time it needs.
    pub fn validate(&self) -> Result<(), OrderError> {
        let order = self.order_no;
        let variant = self.variant;
        if self.schedule.task_end < self.schedule.task_start {
            return Err(OrderError::EndBeforeStart { order });
        }
        if variant.uses_lf() {
            if self.lf_station.is_none() {
                return Err(OrderError::MissingStation { order, variant, family: "LF" });
            }
            if self.schedule.lf_end.is_none() {
                return Err(OrderError::MissingStageTime { order, variant, stage: "LF end" });
            }
        }
        if variant.uses_rh() {
            if self.rh_station.is_none() {
                return Err(OrderError::MissingStation { order, variant, family: "RH" });
            }
            if self.schedule.rh_end.is_none() {
                return Err(OrderError::MissingStageTime { order, variant, stage: "RH end" });
            }
        }
        Ok(())
    }

    /// Latest scheduled time of any stage, used for timeout computation.
    pub fn latest_end(&self) -> Ticks {
        let s = &self.schedule;
        [Some(s.task_end), s.lf_end, s.rh_end]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(s.task_start)
    }
}

// ---------------------------------------------------------------------------
// Goods
// ---------------------------------------------------------------------------

/// Where a goods item currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoodsLocation {
    Station(StationKey),
    Vehicle(VehicleKey),
    /// Removed at the terminal station; only seen in the delivered archive.
    Delivered(StationKey),
}

/// One entry of the per-goods station ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationVisit {
    pub station: String,
    pub arrived_at: Ticks,
    pub departed_at: Option<Ticks>,
}

/// One physical ladle lot, tied 1:1 to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goods {
    pub goods_id: String,
    pub order_key: OrderKey,
    pub order_no: OrderNo,
    pub origin: StationKey,
    pub terminal: StationKey,
    pub variant: RefineVariant,
    pub location: GoodsLocation,
    pub ledger: Vec<StationVisit>,
}

impl Goods {
    /// Registry name for the goods of an order.
    pub fn name_for(order_no: OrderNo) -> String {
        format!("goods_{order_no}")
    }

    pub fn record_arrival(&mut self, station: &str, at: Ticks) {
        self.ledger.push(StationVisit {
            station: station.to_string(),
            arrived_at: at,
            departed_at: None,
        });
    }

    /// Close the most recent open visit at `station`. Returns false if there
    /// was none.
    pub fn record_departure(&mut self, station: &str, at: Ticks) -> bool {
        match self
            .ledger
            .iter_mut()
            .rev()
            .find(|v| v.station == station && v.departed_at.is_none())
        {
            Some(visit) => {
                visit.departed_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub fn reached_terminal(&self) -> bool {
        matches!(self.location, GoodsLocation::Delivered(_))
            || self.location == GoodsLocation::Station(self.terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn lf_order() -> ProductionOrder {
        ProductionOrder {
            order_no: OrderNo(1),
            origin: "1LD".into(),
            terminal: "1CC".into(),
            variant: RefineVariant::Lf,
            lf_station: Some("1LF".into()),
            rh_station: None,
            schedule: StageSchedule {
                task_start: 0,
                task_end: 7200,
                lf_start: Some(600),
                lf_end: Some(4200),
                rh_start: None,
                rh_end: None,
            },
            durations: LegDurations {
                ld_to_lf: Some(5),
                lf_process: Some(60),
                lf_to_cc: Some(8),
                ..Default::default()
            },
            progress: StageProgress::default(),
        }
    }

    #[test]
    fn variant_leg_templates() {
        assert_eq!(RefineVariant::Lf.legs(), &[LegKind::LdToLf, LegKind::LfToCc]);
        assert_eq!(RefineVariant::Rh.legs(), &[LegKind::LdToRh, LegKind::RhToCc]);
        assert_eq!(RefineVariant::LfRh.legs().len(), 3);
        assert!(RefineVariant::LfRh.uses_lf() && RefineVariant::LfRh.uses_rh());
    }

    #[test]
    fn validate_accepts_complete_order() {
        assert!(lf_order().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_lf_station() {
        let mut order = lf_order();
        order.lf_station = None;
        assert!(matches!(
            order.validate(),
            Err(OrderError::MissingStation { family: "LF", .. })
        ));
    }

    #[test]
    fn validate_rejects_rh_variant_without_rh_end() {
        let mut order = lf_order();
        order.variant = RefineVariant::LfRh;
        order.rh_station = Some("1RH".into());
        assert!(matches!(
            order.validate(),
            Err(OrderError::MissingStageTime { stage: "RH end", .. })
        ));
    }

    #[test]
    fn latest_end_takes_max_stage() {
        let mut order = lf_order();
        assert_eq!(order.latest_end(), 7200);
        order.schedule.lf_end = Some(9000);
        assert_eq!(order.latest_end(), 9000);
    }

    #[test]
    fn durations_for_leg() {
        let order = lf_order();
        assert_eq!(order.durations.for_leg(LegKind::LdToLf), 5);
        assert_eq!(order.durations.for_leg(LegKind::LfToCc), 8);
        assert_eq!(order.durations.for_leg(LegKind::RhToCc), 0);
    }

    #[test]
    fn variant_parses_from_plant_labels() {
        let v: RefineVariant = serde_json::from_str("\"LF+RH\"").unwrap();
        assert_eq!(v, RefineVariant::LfRh);
        let v: RefineVariant = serde_json::from_str("\"RH\"").unwrap();
        assert_eq!(v, RefineVariant::Rh);
    }

    #[test]
    fn goods_ledger_arrival_and_departure() {
        let mut orders: SlotMap<OrderKey, ()> = SlotMap::with_key();
        let mut stations: SlotMap<StationKey, ()> = SlotMap::with_key();
        let origin = stations.insert(());
        let terminal = stations.insert(());
        let mut goods = Goods {
            goods_id: Goods::name_for(OrderNo(3)),
            order_key: orders.insert(()),
            order_no: OrderNo(3),
            origin,
            terminal,
            variant: RefineVariant::Lf,
            location: GoodsLocation::Station(origin),
            ledger: Vec::new(),
        };
        assert_eq!(goods.goods_id, "goods_3");
        goods.record_arrival("1LD", 10);
        assert!(goods.record_departure("1LD", 40));
        assert!(!goods.record_departure("1LD", 50));
        assert_eq!(goods.ledger[0].departed_at, Some(40));
        assert!(!goods.reached_terminal());
        goods.location = GoodsLocation::Station(terminal);
        assert!(goods.reached_terminal());
    }
}
