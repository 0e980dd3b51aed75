//! 集成测试公共工具

#![allow(dead_code)]

use rabbit_pwm::pca9685::Pca9685Connector;
use rabbit_pwm::{MockChip, MockConnector};
use rabbit_servo::{ServoConfig, Servos};
use std::thread;
use std::time::{Duration, Instant};

/// 测试用配置：`chips` 个芯片，快速调度周期，短排空超时
pub fn test_config(chips: usize, tick_ms: u64) -> ServoConfig {
    ServoConfig {
        tick_ms,
        chip_addresses: (0..chips as u16).map(|i| 0x40 + i).collect(),
        drain_timeout_ms: 200,
        ..Default::default()
    }
}

/// 在模拟芯片上启动调度器，返回调度器和芯片句柄
pub fn start_mock(config: &ServoConfig) -> (Servos, Vec<MockChip>) {
    let chips: Vec<MockChip> = config.chip_addresses.iter().map(|_| MockChip::new()).collect();
    let servos = start_with_chips(config, &chips);
    (servos, chips)
}

pub fn start_with_chips(config: &ServoConfig, chips: &[MockChip]) -> Servos {
    let connectors = chips
        .iter()
        .zip(&config.chip_addresses)
        .map(|(chip, address)| {
            Pca9685Connector::new(
                MockConnector::new(chip.clone(), format!("mock@0x{:02x}", address)),
                config.frequency_hz,
            )
        })
        .collect();
    Servos::start(config, connectors).expect("failed to start servos")
}

/// 轮询直到条件成立或超时
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// 50Hz 下脉宽对应的 OFF 计数
pub fn off_count(pulse_us: u32) -> u16 {
    rabbit_pwm::pca9685::pulse_to_off_count(pulse_us, 50)
}
