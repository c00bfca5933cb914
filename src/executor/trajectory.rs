use std::{f64::consts::TAU, time::Duration};

use rand::Rng;

/// Below this distance (px) the pointer jumps straight to the target.
pub const DIRECT_JUMP_DISTANCE: f64 = 5.0;

const OVERSHOOT_RADIUS: (f64, f64) = (15.0, 30.0);
const CORRECTION_RADIUS: (f64, f64) = (8.0, 30.0);
const CORRECTION_STEPS: (u32, u32) = (5, 8);
const SETTLE_STEPS: (u32, u32) = (3, 6);
const CORRECTION_JITTER: f64 = 0.5;
const SETTLE_JITTER: f64 = 0.8;
const OVERSHOOT_DELAY_MS: (f64, f64) = (6.0, 14.0);
const FINE_DELAY_MS: (f64, f64) = (2.0, 6.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
  Direct,
  Overshoot,
  Correction,
  Settle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Waypoint {
  pub x: i32,
  pub y: i32,
  /// Pause after moving to this point.
  pub delay: Duration,
  pub phase: Phase,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointerTrajectory {
  pub waypoints: Vec<Waypoint>,
}

impl PointerTrajectory {
  pub fn last(&self) -> Option<&Waypoint> {
    self.waypoints.last()
  }

  pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Waypoint> {
    self.waypoints.iter().filter(move |point| point.phase == phase)
  }

  pub fn total_delay(&self) -> Duration {
    self.waypoints.iter().map(|point| point.delay).sum()
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Point {
  x: f64,
  y: f64,
}

impl Point {
  fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  fn lerp(self, to: Point, t: f64) -> Point {
    Point::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
  }

  fn distance(self, to: Point) -> f64 {
    (to.x - self.x).hypot(to.y - self.y)
  }
}

fn ease_in_out_cubic(t: f64) -> f64 {
  if t < 0.5 {
    4.0 * t * t * t
  } else {
    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
  }
}

fn ease_out_cubic(t: f64) -> f64 {
  1.0 - (1.0 - t).powi(3)
}

fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
  let u = 1.0 - t;
  let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
  Point::new(
    a * p0.x + b * p1.x + c * p2.x + d * p3.x,
    a * p0.y + b * p1.y + c * p2.y + d * p3.y,
  )
}

/// Plans human-looking pointer moves: an eased curve that overshoots the
/// target, a short jittered correction, then a decelerating settle that ends
/// exactly on the target.
pub struct TrajectoryPlanner<R: Rng> {
  rng: R,
  delay_scale: f64,
}

impl<R: Rng> TrajectoryPlanner<R> {
  pub fn new(rng: R, delay_scale: f64) -> Self {
    Self {
      rng,
      delay_scale: delay_scale.max(0.0),
    }
  }

  pub fn plan(&mut self, start: (i32, i32), target: (i32, i32)) -> PointerTrajectory {
    let origin = Point::new(f64::from(start.0), f64::from(start.1));
    let goal = Point::new(f64::from(target.0), f64::from(target.1));
    let distance = origin.distance(goal);

    if distance < DIRECT_JUMP_DISTANCE {
      return PointerTrajectory {
        waypoints: vec![Waypoint {
          x: target.0,
          y: target.1,
          delay: Duration::ZERO,
          phase: Phase::Direct,
        }],
      };
    }

    let mut waypoints = Vec::new();
    let overshoot = self.overshoot(origin, goal, distance, &mut waypoints);
    let correction = self.correction(overshoot, goal, &mut waypoints);
    self.settle(correction, goal, &mut waypoints);

    if let Some(last) = waypoints.last_mut() {
      last.x = target.0;
      last.y = target.1;
    }
    PointerTrajectory { waypoints }
  }

  fn overshoot(&mut self, origin: Point, goal: Point, distance: f64, out: &mut Vec<Waypoint>) -> Point {
    let end = self.point_near(goal, OVERSHOOT_RADIUS);
    let midpoint = origin.lerp(end, 0.5);
    let spread = (distance * 0.3).clamp(10.0, 200.0);
    let control_a = Point::new(
      midpoint.x + self.rng.random_range(-spread..=spread),
      midpoint.y + self.rng.random_range(-spread..=spread),
    );
    let control_b = Point::new(
      midpoint.x + self.rng.random_range(-spread..=spread),
      midpoint.y + self.rng.random_range(-spread..=spread),
    );

    let steps = ((distance / 25.0).round() as u32).max(5);
    for step in 1..=steps {
      let t = ease_in_out_cubic(f64::from(step) / f64::from(steps));
      let point = cubic_bezier(origin, control_a, control_b, end, t);
      self.push(out, point, Phase::Overshoot, OVERSHOOT_DELAY_MS);
    }
    end
  }

  fn correction(&mut self, from: Point, goal: Point, out: &mut Vec<Waypoint>) -> Point {
    let end = self.point_near(goal, CORRECTION_RADIUS);
    let steps = self.rng.random_range(CORRECTION_STEPS.0..=CORRECTION_STEPS.1);
    for step in 1..=steps {
      let mut point = from.lerp(end, f64::from(step) / f64::from(steps));
      if step < steps {
        point = self.jitter(point, CORRECTION_JITTER);
      }
      self.push(out, point, Phase::Correction, FINE_DELAY_MS);
    }
    end
  }

  fn settle(&mut self, from: Point, goal: Point, out: &mut Vec<Waypoint>) {
    let steps = self.rng.random_range(SETTLE_STEPS.0..=SETTLE_STEPS.1);
    for step in 1..=steps {
      let t = ease_out_cubic(f64::from(step) / f64::from(steps));
      let point = if step < steps {
        self.jitter(from.lerp(goal, t), SETTLE_JITTER)
      } else {
        goal
      };
      self.push(out, point, Phase::Settle, FINE_DELAY_MS);
    }
  }

  fn point_near(&mut self, center: Point, radius: (f64, f64)) -> Point {
    let angle = self.rng.random_range(0.0..TAU);
    let distance = self.rng.random_range(radius.0..=radius.1);
    Point::new(center.x + distance * angle.cos(), center.y + distance * angle.sin())
  }

  fn jitter(&mut self, point: Point, amount: f64) -> Point {
    Point::new(
      point.x + self.rng.random_range(-amount..=amount),
      point.y + self.rng.random_range(-amount..=amount),
    )
  }

  fn push(&mut self, out: &mut Vec<Waypoint>, point: Point, phase: Phase, delay_ms: (f64, f64)) {
    let millis = self.rng.random_range(delay_ms.0..=delay_ms.1) * self.delay_scale;
    out.push(Waypoint {
      x: point.x.round() as i32,
      y: point.y.round() as i32,
      delay: Duration::from_secs_f64(millis / 1000.0),
      phase,
    });
  }
}
