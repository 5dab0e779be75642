use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Exploring,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Exploring => "exploring",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single itinerary item. The common header lives here, the per-type
/// payload in [`EventDetails`], flattened next to the `type` tag on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(flatten)]
    pub details: EventDetails,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
}

impl Event {
    pub fn new(id: impl Into<String>, details: EventDetails) -> Self {
        Self {
            id: id.into(),
            details,
            date: None,
            end_date: None,
            status: EventStatus::default(),
            notes: None,
            thumbnail_url: None,
            created_by: None,
            created_at: None,
            updated_by: None,
            updated_at: None,
            likes: Vec::new(),
            dislikes: Vec::new(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }

    /// Every user-visible field with its normalized value, in a stable order.
    /// Authorship metadata and votes are not part of this set.
    pub fn visible_fields(&self) -> Vec<(&'static str, Option<String>)> {
        let mut fields = vec![
            ("type", Some(self.kind().as_str().to_string())),
            ("date", self.date.map(|d| d.to_rfc3339())),
            ("endDate", self.end_date.map(|d| d.to_rfc3339())),
            ("status", Some(self.status.as_str().to_string())),
            ("notes", normalize(&self.notes)),
            ("thumbnailUrl", normalize(&self.thumbnail_url)),
        ];
        fields.extend(self.details.visible_fields());
        fields
    }
}

/// Collapses missing and empty values so they compare equal.
pub fn normalize(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn normalize_time(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.map(|v| v.to_rfc3339())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Arrival,
    Departure,
    Flight,
    Train,
    Bus,
    RentalCar,
    Stay,
    Activity,
    Destination,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Arrival => "arrival",
            EventKind::Departure => "departure",
            EventKind::Flight => "flight",
            EventKind::Train => "train",
            EventKind::Bus => "bus",
            EventKind::RentalCar => "rental_car",
            EventKind::Stay => "stay",
            EventKind::Activity => "activity",
            EventKind::Destination => "destination",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetails {
    Arrival(PortDetails),
    Departure(PortDetails),
    Flight(FlightDetails),
    Train(TrainDetails),
    Bus(BusDetails),
    RentalCar(RentalCarDetails),
    Stay(StayDetails),
    Activity(ActivityDetails),
    Destination(DestinationDetails),
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::Arrival(_) => EventKind::Arrival,
            EventDetails::Departure(_) => EventKind::Departure,
            EventDetails::Flight(_) => EventKind::Flight,
            EventDetails::Train(_) => EventKind::Train,
            EventDetails::Bus(_) => EventKind::Bus,
            EventDetails::RentalCar(_) => EventKind::RentalCar,
            EventDetails::Stay(_) => EventKind::Stay,
            EventDetails::Activity(_) => EventKind::Activity,
            EventDetails::Destination(_) => EventKind::Destination,
        }
    }

    fn visible_fields(&self) -> Vec<(&'static str, Option<String>)> {
        match self {
            EventDetails::Arrival(d) | EventDetails::Departure(d) => vec![
                ("airport", normalize(&d.airport)),
                ("airline", normalize(&d.airline)),
                ("flightNumber", normalize(&d.flight_number)),
                ("terminal", normalize(&d.terminal)),
                ("gate", normalize(&d.gate)),
            ],
            EventDetails::Flight(d) => vec![
                ("airline", normalize(&d.airline)),
                ("flightNumber", normalize(&d.flight_number)),
                ("departureAirport", normalize(&d.departure_airport)),
                ("arrivalAirport", normalize(&d.arrival_airport)),
                ("terminal", normalize(&d.terminal)),
                ("gate", normalize(&d.gate)),
                ("bookingReference", normalize(&d.booking_reference)),
            ],
            EventDetails::Train(d) => vec![
                ("trainOperator", normalize(&d.train_operator)),
                ("trainNumber", normalize(&d.train_number)),
                ("departureStation", normalize(&d.departure_station)),
                ("arrivalStation", normalize(&d.arrival_station)),
                ("carriage", normalize(&d.carriage)),
                ("seat", normalize(&d.seat)),
                ("bookingReference", normalize(&d.booking_reference)),
            ],
            EventDetails::Bus(d) => vec![
                ("busOperator", normalize(&d.bus_operator)),
                ("busNumber", normalize(&d.bus_number)),
                ("departureStation", normalize(&d.departure_station)),
                ("arrivalStation", normalize(&d.arrival_station)),
                ("seat", normalize(&d.seat)),
                ("bookingReference", normalize(&d.booking_reference)),
            ],
            EventDetails::RentalCar(d) => vec![
                ("company", normalize(&d.company)),
                ("carType", normalize(&d.car_type)),
                ("pickupLocation", normalize(&d.pickup_location)),
                ("dropoffLocation", normalize(&d.dropoff_location)),
                ("bookingReference", normalize(&d.booking_reference)),
            ],
            EventDetails::Stay(d) => vec![
                ("accommodationName", normalize(&d.accommodation_name)),
                ("address", normalize(&d.address)),
                ("checkIn", normalize_time(&d.check_in)),
                ("checkOut", normalize_time(&d.check_out)),
                ("reservationNumber", normalize(&d.reservation_number)),
                ("contactInfo", normalize(&d.contact_info)),
            ],
            EventDetails::Activity(d) => vec![
                ("title", normalize(&d.title)),
                ("location", normalize(&d.location)),
                ("address", normalize(&d.address)),
                ("bookingReference", normalize(&d.booking_reference)),
            ],
            EventDetails::Destination(d) => vec![
                ("placeName", normalize(&d.place_name)),
                ("country", normalize(&d.country)),
            ],
        }
    }
}

/// Payload shared by arrivals and departures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortDetails {
    pub airport: Option<String>,
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub terminal: Option<String>,
    pub gate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlightDetails {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub terminal: Option<String>,
    pub gate: Option<String>,
    pub booking_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrainDetails {
    pub train_operator: Option<String>,
    pub train_number: Option<String>,
    pub departure_station: Option<String>,
    pub arrival_station: Option<String>,
    pub carriage: Option<String>,
    pub seat: Option<String>,
    pub booking_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusDetails {
    pub bus_operator: Option<String>,
    pub bus_number: Option<String>,
    pub departure_station: Option<String>,
    pub arrival_station: Option<String>,
    pub seat: Option<String>,
    pub booking_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RentalCarDetails {
    pub company: Option<String>,
    pub car_type: Option<String>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub booking_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StayDetails {
    pub accommodation_name: Option<String>,
    pub address: Option<String>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub reservation_number: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetails {
    pub title: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub booking_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DestinationDetails {
    pub place_name: Option<String>,
    pub country: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_flattened_variant_payload() {
        let event: Event = serde_json::from_value(json!({
            "id": "b",
            "type": "flight",
            "airline": "X",
            "flightNumber": "X123",
            "status": "exploring",
        }))
        .expect("flight event");

        assert_eq!(event.kind(), EventKind::Flight);
        assert_eq!(event.status, EventStatus::Exploring);
        match &event.details {
            EventDetails::Flight(flight) => {
                assert_eq!(flight.airline.as_deref(), Some("X"));
                assert_eq!(flight.flight_number.as_deref(), Some("X123"));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn serializes_type_tag_next_to_header() {
        let event = Event::new("s1", EventDetails::RentalCar(RentalCarDetails::default()));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "rental_car");
        assert_eq!(value["id"], "s1");
        assert_eq!(value["status"], "confirmed");
        assert!(value.get("createdBy").is_none());
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let result: Result<Event, _> = serde_json::from_value(json!({ "id": "x", "type": "boat" }));
        assert!(result.is_err());
    }

    #[test]
    fn empty_and_missing_values_normalize_alike() {
        let mut with_empty = Event::new("a", EventDetails::Stay(StayDetails::default()));
        with_empty.notes = Some(String::new());
        let missing = Event::new("a", EventDetails::Stay(StayDetails::default()));
        assert_eq!(with_empty.visible_fields(), missing.visible_fields());
    }
}
