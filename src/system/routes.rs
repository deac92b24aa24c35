//! Route table of the deployment site
//!
//! Coordinates in centimeters from the docking point, x along the corridor.
//! Every route starts where the previous return leg ended.

use amr_nav::odometry::Point;
use amr_nav::route::Route;

static CORRIDOR: [Point; 3] = [Point::new(0.0, 0.0), Point::new(400.0, 0.0), Point::new(800.0, 0.0)];

static LAB_LOOP: [Point; 5] = [
    Point::new(0.0, 0.0),
    Point::new(300.0, 0.0),
    Point::new(300.0, 250.0),
    Point::new(0.0, 250.0),
    Point::new(0.0, 0.0),
];

static STORAGE_ROOM: [Point; 4] = [
    Point::new(0.0, 0.0),
    Point::new(250.0, 0.0),
    Point::new(250.0, -180.0),
    Point::new(420.0, -180.0),
];

pub static ROUTES: [Route; 3] = [
    Route {
        name: "corridor",
        waypoints: &CORRIDOR,
    },
    Route {
        name: "lab loop",
        waypoints: &LAB_LOOP,
    },
    Route {
        name: "storage room",
        waypoints: &STORAGE_ROOM,
    },
];
