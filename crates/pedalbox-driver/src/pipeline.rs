//! 后台 IO 循环模块
//!
//! 网关的四类后台线程循环：
//!
//! - [`rx_loop`]: 指令总线接收 → 路由器
//! - [`tx_loop`]: 通道 → 总线发送（指令总线与执行器总线各一个实例）
//! - [`keep_alive_loop`]: 周期性重发上一条执行器指令
//! - [`pedal_loop`]: 周期性采样踏板并投递产出帧
//!
//! 所有循环通过共享的 `is_running` 标志联动：任何一个检测到致命
//! 错误都会把标志翻为 false，其余循环在下一个周期退出。

use crate::config::EcuConfig;
use crate::error::DriverError;
use crate::pedal::{PedalSource, percent_from_raw, sample_step};
use crate::router::{EcuContext, route_command};
use crossbeam_channel::{Receiver, Sender};
use pedalbox_can::{CanError, RxAdapter, TxAdapter};
use pedalbox_protocol::BusFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, trace, warn};

/// 指令总线接收循环
///
/// 超时靠底层 `SO_RCVTIMEO` 实现，每次超时回来检查一遍运行标志。
/// 路由层的协议错误（无效 ID、越界字节）记录后继续；
/// 总线致命错误与通道断开会翻转运行标志并退出。
pub fn rx_loop(
    mut rx: impl RxAdapter,
    ctx: Arc<EcuContext>,
    actuator_tx: Sender<BusFrame>,
    is_running: Arc<AtomicBool>,
) {
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match rx.receive() {
            Ok(frame) => frame,
            Err(CanError::Timeout) => continue,
            Err(e) if e.is_fatal() => {
                error!("RX thread: Fatal error detected, setting is_running = false: {}", e);
                // Release: All writes before this are visible to threads that see the false value
                is_running.store(false, Ordering::Release);
                break;
            },
            Err(e) => {
                warn!("RX thread: receive error: {}", e);
                continue;
            },
        };

        trace!("RX: command frame ID=0x{:X}, len={}", frame.id(), frame.len);

        match route_command(&ctx, &frame, &actuator_tx) {
            Ok(()) => {},
            Err(DriverError::Protocol(e)) => {
                warn!("RX thread: invalid command from priority bus: {}", e);
            },
            Err(DriverError::ChannelClosed) => {
                trace!("RX thread: actuator channel disconnected, exiting");
                break;
            },
            Err(e) => {
                error!("RX thread: unrecoverable routing error: {}", e);
                is_running.store(false, Ordering::Release);
                break;
            },
        }
    }

    trace!("RX thread: loop exited");
}

/// 总线发送循环
///
/// 从帧通道取帧并写总线，指令总线与执行器总线各跑一个实例。
/// 使用带超时的 `recv` 等待，确保能及时响应退出信号。
pub fn tx_loop(
    mut tx: impl TxAdapter,
    frame_rx: Receiver<BusFrame>,
    is_running: Arc<AtomicBool>,
) {
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match frame_rx.recv_timeout(Duration::from_millis(1)) {
            Ok(frame) => frame,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                trace!("TX thread: frame channel disconnected");
                break;
            },
        };

        match tx.send(frame) {
            Ok(()) => {},
            Err(e) => {
                error!("TX thread: Failed to send frame ID=0x{:X}: {}", frame.id(), e);

                if e.is_fatal() {
                    error!("TX thread: Fatal error detected, setting is_running = false");
                    // Release: All writes before this are visible to threads that see the false value
                    is_running.store(false, Ordering::Release);
                    break;
                }

                // 非致命错误（超时等），出站写是 Fire-and-Forget，丢帧继续
            },
        }
    }

    trace!("TX thread: loop exited");
}

/// 保活重发循环
///
/// 不重发执行器会在超时后松开位置保持。唯一的跳过条件：
/// 刹车已锁定且 `last_dist` 在最小行程——执行器确定静止在原位。
pub fn keep_alive_loop(
    ctx: Arc<EcuContext>,
    actuator_tx: Sender<BusFrame>,
    period: Duration,
    is_running: Arc<AtomicBool>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Keep-alive thread: is_running flag is false, exiting");
            break;
        }

        let frame = {
            let encoder = match ctx.encoder.lock() {
                Ok(encoder) => encoder,
                Err(_) => {
                    error!("Keep-alive thread: encoder lock poisoned, exiting");
                    is_running.store(false, Ordering::Release);
                    break;
                },
            };

            if ctx.modes.is_locked() && encoder.last_dist() == encoder.min_dist() {
                None
            } else {
                Some(encoder.repeat())
            }
        };

        if let Some(frame) = frame {
            trace!("Keep-alive: repeating last actuator command");
            if actuator_tx.send(frame).is_err() {
                trace!("Keep-alive thread: actuator channel disconnected, exiting");
                break;
            }
        }

        spin_sleep::sleep(period);
    }

    trace!("Keep-alive thread: loop exited");
}

/// 踏板采样循环
///
/// 每个周期读一次 ADC，换算为百分比后经 [`sample_step`] 产出
/// 镜像 / KillAuton / 执行器三类帧并投递到对应通道。
/// ADC 读取失败跳过本周期，不翻转运行标志。
pub fn pedal_loop(
    mut pedal: impl PedalSource,
    ctx: Arc<EcuContext>,
    actuator_tx: Sender<BusFrame>,
    command_tx: Sender<BusFrame>,
    config: EcuConfig,
    is_running: Arc<AtomicBool>,
) {
    let period = Duration::from_micros(config.pedal_period_us);

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Pedal thread: is_running flag is false, exiting");
            break;
        }

        let raw = match pedal.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Pedal thread: ADC read failed, skipping sample: {}", e);
                spin_sleep::sleep(period);
                continue;
            },
        };

        let percent = percent_from_raw(raw);

        let output = match sample_step(&ctx, percent, config.deadband_percent) {
            Ok(output) => output,
            Err(e) => {
                error!("Pedal thread: unrecoverable error, exiting: {}", e);
                is_running.store(false, Ordering::Release);
                break;
            },
        };

        let mut disconnected = false;
        if let Some(mirror) = output.mirror {
            disconnected |= command_tx.send(mirror).is_err();
        }
        if let Some(kill) = output.kill_auton {
            trace!("Pedal: pedal pressed, broadcasting KillAuton");
            disconnected |= command_tx.send(kill).is_err();
        }
        if let Some(frame) = output.actuator {
            disconnected |= actuator_tx.send(frame).is_err();
        }

        if disconnected {
            trace!("Pedal thread: frame channel disconnected, exiting");
            break;
        }

        spin_sleep::sleep(period);
    }

    trace!("Pedal thread: loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use pedalbox_protocol::BrakeEncoder;
    use pedalbox_protocol::ids::ID_SET_BRAKE;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;

    const ACTUATOR_ID: u32 = 0xFF0000;

    fn ctx() -> Arc<EcuContext> {
        Arc::new(EcuContext::new(
            BrakeEncoder::new(ACTUATOR_ID, 2000, 0).unwrap(),
        ))
    }

    /// 通道驱动的 RX mock：预置帧取完后一直返回超时
    struct MockRx {
        frames: VecDeque<BusFrame>,
    }

    impl RxAdapter for MockRx {
        fn receive(&mut self) -> Result<BusFrame, CanError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Err(CanError::Timeout)
                },
            }
        }
    }

    /// 把发送的帧收集到共享队列的 TX mock
    #[derive(Clone)]
    struct MockTx {
        sent: Arc<Mutex<Vec<BusFrame>>>,
    }

    impl MockTx {
        fn new() -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl TxAdapter for MockTx {
        fn send(&mut self, frame: BusFrame) -> Result<(), CanError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_rx_loop_routes_and_exits_on_flag() {
        let ctx = ctx();
        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let mock = MockRx {
            frames: VecDeque::from(vec![BusFrame::new_extended(ID_SET_BRAKE, &[50])]),
        };

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let handle = thread::spawn(move || {
            rx_loop(mock, ctx_clone, tx, running_clone);
        });

        let frame = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.id(), ACTUATOR_ID);
        assert_eq!(ctx.encoder.lock().unwrap().last_dist(), 1500);

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_tx_loop_drains_channel() {
        let mock = MockTx::new();
        let sent = mock.sent.clone();
        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let running_clone = is_running.clone();
        let handle = thread::spawn(move || {
            tx_loop(mock, rx, running_clone);
        });

        tx.send(BusFrame::new_extended(ACTUATOR_ID, &[0x0F, 0x4A])).unwrap();
        tx.send(BusFrame::new_extended(ACTUATOR_ID, &[0x0F, 0x4A, 1])).unwrap();

        // 通道断开后 TX 循环自行退出
        drop(tx);
        handle.join().unwrap();

        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_keep_alive_repeats_when_unlocked() {
        let ctx = ctx();
        ctx.encoder.lock().unwrap().from_percent(50);

        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let handle = thread::spawn(move || {
            keep_alive_loop(ctx_clone, tx, Duration::from_millis(5), running_clone);
        });

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.data_slice()[..4], [0x0F, 0x4A, 0xDC, 0xC5]);

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_keep_alive_elided_when_locked_at_rest() {
        let ctx = ctx();
        ctx.modes.lock();
        // last_dist == min_dist：执行器静止在原位

        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let handle = thread::spawn(move || {
            keep_alive_loop(ctx_clone, tx, Duration::from_millis(2), running_clone);
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_keep_alive_resends_when_locked_but_not_at_rest() {
        let ctx = ctx();
        ctx.encoder.lock().unwrap().from_percent(30);
        ctx.modes.lock();

        let (tx, rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let handle = thread::spawn(move || {
            keep_alive_loop(ctx_clone, tx, Duration::from_millis(2), running_clone);
        });

        // 锁定但行程未回位，必须继续保活
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    /// 脚本化踏板：按序返回预置读数，之后保持最后一个值
    struct ScriptedPedal {
        readings: VecDeque<u16>,
        last: u16,
    }

    impl PedalSource for ScriptedPedal {
        fn read_raw(&mut self) -> std::io::Result<u16> {
            if let Some(raw) = self.readings.pop_front() {
                self.last = raw;
            }
            Ok(self.last)
        }
    }

    #[test]
    fn test_pedal_loop_presses_and_kills_auton() {
        let ctx = ctx();
        let (act_tx, act_rx) = unbounded();
        let (cmd_tx, cmd_rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        // raw 500 → 1.61V → 3572Ω → 71%，持续踩下
        let pedal = ScriptedPedal {
            readings: VecDeque::from(vec![0, 500]),
            last: 0,
        };

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let config = EcuConfig {
            pedal_period_us: 200,
            ..EcuConfig::default()
        };
        let handle = thread::spawn(move || {
            pedal_loop(pedal, ctx_clone, act_tx, cmd_tx, config, running_clone);
        });

        // 首个越过死区的采样发一条 KillAuton
        let kill = cmd_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(kill.id(), 0x0);

        // 执行器帧持续产出
        let frame = act_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.data_slice()[..2], [0x0F, 0x4A]);
        assert!(act_rx.recv_timeout(Duration::from_secs(1)).is_ok());

        // KillAuton 不重复
        assert!(cmd_rx.try_recv().is_err());

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_pedal_loop_mirrors_in_training() {
        let ctx = ctx();
        ctx.modes.enter_training();
        let (act_tx, _act_rx) = unbounded();
        let (cmd_tx, cmd_rx) = unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let pedal = ScriptedPedal {
            readings: VecDeque::new(),
            last: 0,
        };

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let config = EcuConfig {
            pedal_period_us: 200,
            ..EcuConfig::default()
        };
        let handle = thread::spawn(move || {
            pedal_loop(pedal, ctx_clone, act_tx, cmd_tx, config, running_clone);
        });

        // 零读数也会镜像
        let mirror = cmd_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(mirror.id(), ID_SET_BRAKE);
        assert_eq!(mirror.data_slice(), &[0]);

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
    }
}
