use pd_common::MoneyCents;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{NewStop, VehicleType},
    helpers::geo::{haversine_m, GeoPoint},
};

#[derive(Debug, Clone, Error)]
#[error("Pricing error: {0}")]
pub struct PricingError(pub String);

/// One line of the fare breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareComponent {
    pub label: String,
    pub amount: MoneyCents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareQuote {
    pub total: MoneyCents,
    pub breakdown: Vec<FareComponent>,
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

/// The fare-computation collaborator, called synchronously during order creation. Failures are attributed to the
/// pricing service by the caller; this crate never computes fares itself in production.
#[allow(async_fn_in_trait)]
pub trait PricingEngine: Send + Sync {
    async fn estimate(
        &self,
        stops: &[NewStop],
        vehicle: VehicleType,
        porter_count: i64,
    ) -> Result<FareQuote, PricingError>;
}

/// Deterministic distance-based pricing for tests and local development: a base callout fee, a per-kilometre rate
/// scaled by vehicle, and a surcharge per extra porter.
#[derive(Debug, Clone)]
pub struct FlatRatePricing {
    pub base: MoneyCents,
    pub per_km: MoneyCents,
    pub per_extra_porter: MoneyCents,
}

impl Default for FlatRatePricing {
    fn default() -> Self {
        Self { base: MoneyCents::from(500), per_km: MoneyCents::from(150), per_extra_porter: MoneyCents::from(1000) }
    }
}

// Assumed average speed for the duration estimate, in metres per second.
const AVERAGE_SPEED_MPS: f64 = 8.0;

impl FlatRatePricing {
    fn vehicle_multiplier(vehicle: VehicleType) -> i64 {
        match vehicle {
            VehicleType::Motorbike => 1,
            VehicleType::Car => 2,
            VehicleType::Van => 3,
            VehicleType::Truck => 5,
        }
    }

    fn route_distance_m(stops: &[NewStop]) -> f64 {
        stops
            .windows(2)
            .map(|pair| {
                let from = GeoPoint::new(pair[0].latitude, pair[0].longitude);
                let to = GeoPoint::new(pair[1].latitude, pair[1].longitude);
                haversine_m(from, to)
            })
            .sum()
    }
}

impl PricingEngine for FlatRatePricing {
    async fn estimate(
        &self,
        stops: &[NewStop],
        vehicle: VehicleType,
        porter_count: i64,
    ) -> Result<FareQuote, PricingError> {
        if stops.len() < 2 {
            return Err(PricingError("A route needs at least two stops".to_string()));
        }
        let distance_m = Self::route_distance_m(stops);
        let km = (distance_m / 1000.0).ceil() as i64;
        let distance_fee = self.per_km * (km * Self::vehicle_multiplier(vehicle));
        let porter_fee = self.per_extra_porter * (porter_count - 1).max(0);
        let total = self.base + distance_fee + porter_fee;
        let breakdown = vec![
            FareComponent { label: "base".to_string(), amount: self.base },
            FareComponent { label: "distance".to_string(), amount: distance_fee },
            FareComponent { label: "porters".to_string(), amount: porter_fee },
        ];
        Ok(FareQuote {
            total,
            breakdown,
            distance_meters: distance_m.round() as i64,
            duration_seconds: (distance_m / AVERAGE_SPEED_MPS).round() as i64,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::StopType;

    fn route() -> Vec<NewStop> {
        vec![
            NewStop::new(1, StopType::Pickup, "Start", 51.5007, -0.1246),
            NewStop::new(2, StopType::Dropoff, "End", 51.5055, -0.0754),
        ]
    }

    #[tokio::test]
    async fn flat_rate_is_deterministic() {
        let pricing = FlatRatePricing::default();
        let a = pricing.estimate(&route(), VehicleType::Van, 2).await.unwrap();
        let b = pricing.estimate(&route(), VehicleType::Van, 2).await.unwrap();
        assert_eq!(a.total, b.total);
        assert_eq!(a.distance_meters, b.distance_meters);
        // Westminster to Tower Bridge is a shade under 3.5 km, so 4 chargeable km.
        assert_eq!(a.total, MoneyCents::from(500) + MoneyCents::from(150) * (4 * 3) + MoneyCents::from(1000));
        assert_eq!(a.breakdown.len(), 3);
    }

    #[tokio::test]
    async fn single_stop_route_is_rejected() {
        let pricing = FlatRatePricing::default();
        let stops = vec![NewStop::new(1, StopType::Pickup, "Start", 0.0, 0.0)];
        let err = pricing.estimate(&stops, VehicleType::Car, 1).await.unwrap_err();
        assert!(err.to_string().contains("two stops"));
    }
}
