//! Test mode: a staircase PWM sweep for characterizing fan response.
//!
//! Both fans are driven to the same level. The level starts at 0, rises by a
//! fixed increment every step until `steps` levels have been visited, then
//! wraps back to 0.

use hardware::fan::FAN_PWM_RANGE;

/// PWM increment between staircase levels.
///
/// The increment is rounded up so the last level reaches the top of the fan
/// range; the fan driver limits any overshoot. Fewer than two steps means a
/// single jump across the full range.
pub fn pwm_per_step(steps: u16) -> i32 {
    if steps < 2 {
        return FAN_PWM_RANGE as i32;
    }
    (FAN_PWM_RANGE as i32 + steps as i32 - 2) / (steps as i32 - 1)
}

/// Staircase state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestMode {
    cur_pwm: i32,
    cur_step: u16,
    steps: u16,
    cycles_in_step: u32,
    cycles_per_step: u32,
    pwm_per_step: i32,
}

impl TestMode {
    /// Restart the staircase at level 0.
    pub fn init(&mut self, steps: u16, time_in_step: u16, exec_per_sec: u32) {
        self.cur_pwm = 0;
        self.cur_step = 1;
        self.steps = steps;
        self.cycles_in_step = 0;
        self.cycles_per_step = time_in_step as u32 * exec_per_sec;
        self.pwm_per_step = pwm_per_step(steps);
    }

    /// Level to command this cycle; advances the staircase.
    pub fn next_pwm(&mut self) -> i32 {
        let pwm = self.cur_pwm;

        self.cycles_in_step += 1;
        if self.cycles_in_step > self.cycles_per_step {
            self.cycles_in_step = 0;
            if self.cur_step >= self.steps {
                self.cur_step = 1;
                self.cur_pwm = 0;
            } else {
                self.cur_step += 1;
                self.cur_pwm += self.pwm_per_step;
            }
        }

        pwm
    }

    pub fn cur_step(&self) -> u16 {
        self.cur_step
    }

    pub fn cycles_per_step(&self) -> u32 {
        self.cycles_per_step
    }

    pub fn pwm_per_step(&self) -> i32 {
        self.pwm_per_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pwm_per_step_rounds_up() {
        assert_eq!(pwm_per_step(4), 683);
        assert_eq!(pwm_per_step(2), 2047);
        assert_eq!(pwm_per_step(3), 1024);
        assert_eq!(pwm_per_step(2048), 1);
        assert_eq!(pwm_per_step(1), 2047);
        assert_eq!(pwm_per_step(0), 2047);
    }

    #[test]
    fn test_staircase_levels() {
        let mut test = TestMode::default();
        test.init(4, 2, 10);
        assert_eq!(test.cycles_per_step(), 20);
        assert_eq!(test.pwm_per_step(), 683);

        // A level is held until the in-step counter exceeds cycles_per_step
        let levels: Vec<i32> = (0..21 * 5).map(|_| test.next_pwm()).collect();
        for (i, expected) in [0, 683, 1366, 2049, 0].iter().enumerate() {
            assert!(
                levels[i * 21..(i + 1) * 21].iter().all(|v| v == expected),
                "level {i} expected {expected}"
            );
        }
        assert_eq!(test.cur_step(), 2);
    }

    #[test]
    fn test_zero_time_in_step() {
        let mut test = TestMode::default();
        test.init(3, 0, 10);
        let levels: Vec<i32> = (0..4).map(|_| test.next_pwm()).collect();
        assert_eq!(levels, vec![0, 1024, 2048, 0]);
    }

    #[test]
    fn test_max_step_count_wraps() {
        let mut test = TestMode::default();
        test.init(u16::MAX, 0, 10);
        assert_eq!(test.pwm_per_step(), 1);

        let levels: Vec<i32> = (0..u16::MAX as usize + 1).map(|_| test.next_pwm()).collect();
        assert_eq!(levels[1], 1);
        assert_eq!(levels[u16::MAX as usize - 1], i32::from(u16::MAX) - 1);
        assert_eq!(levels[u16::MAX as usize], 0);
        assert_eq!(test.cur_step(), 2);
    }
}
