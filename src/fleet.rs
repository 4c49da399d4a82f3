// Fleet catalog: the cars the engine can take bookings for.
// The catalog itself belongs to a fleet-management collaborator; the engine only reads it.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::model::{Car, CarId};

pub trait CarCatalog: Send + Sync + 'static {
    fn car(&self, car_id: CarId) -> Option<Car>;

    // Ordered by car id
    fn cars(&self) -> Vec<Car>;

    fn len(&self) -> usize {
        self.cars().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFleet {
    cars: RwLock<BTreeMap<CarId, Car>>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cars(cars: impl IntoIterator<Item = Car>) -> Self {
        let fleet = Self::new();
        for car in cars {
            fleet.upsert(car);
        }
        fleet
    }

    // Returns the previous entry when the id was already registered
    pub fn upsert(&self, car: Car) -> Option<Car> {
        self.cars.write().insert(car.car_id, car)
    }
}

impl CarCatalog for InMemoryFleet {
    fn car(&self, car_id: CarId) -> Option<Car> {
        self.cars.read().get(&car_id).cloned()
    }

    fn cars(&self) -> Vec<Car> {
        self.cars.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.cars.read().len()
    }
}
