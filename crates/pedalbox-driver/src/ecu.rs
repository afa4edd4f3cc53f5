//! 网关主体
//!
//! [`BrakeEcu`] 封装全部后台线程与通道：
//!
//! ```text
//! 指令总线 RX ─→ rx_loop ─→ 路由器 ─┐
//! 踏板 ADC   ─→ pedal_loop ────────┼─→ 执行器帧通道 ─→ tx_loop ─→ 执行器总线
//! 保活       ─→ keep_alive_loop ───┘
//!                └──────── 镜像/KillAuton ─→ 指令帧通道 ─→ tx_loop ─→ 指令总线
//! ```
//!
//! 每条总线的 TX 由单一线程独占，发送天然串行化；
//! 编码器的读-改-写在互斥锁内完成，撕裂的 `last_dist` 读取
//! 会把执行器推到错误位置。

use crate::config::EcuConfig;
use crate::error::DriverError;
use crate::pedal::PedalSource;
use crate::pipeline::{keep_alive_loop, pedal_loop, rx_loop, tx_loop};
use crate::router::EcuContext;
use crossbeam_channel::Sender;
use pedalbox_can::{RxAdapter, TxAdapter};
use pedalbox_protocol::{BrakeEncoder, BusFrame};
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: std::marker::Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程执行真正的 join，主线程带超时等待结果
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(std::boxed::Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "Thread join timeout"),
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(std::boxed::Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "Thread panicked during join",
                )))
            },
        }
    }
}

/// 刹车执行器网关
///
/// 持有五个后台线程（指令 RX、两个 TX、保活、踏板采样）与
/// 它们之间的帧通道。Drop 时翻转运行标志、断开通道并逐个 join。
pub struct BrakeEcu {
    ctx: Arc<EcuContext>,
    is_running: Arc<AtomicBool>,

    /// 执行器帧通道发送端（Drop 时需先于 join 被真正释放）
    actuator_tx: ManuallyDrop<Sender<BusFrame>>,
    /// 指令帧通道发送端
    command_tx: ManuallyDrop<Sender<BusFrame>>,

    rx_thread: Option<JoinHandle<()>>,
    actuator_tx_thread: Option<JoinHandle<()>>,
    command_tx_thread: Option<JoinHandle<()>>,
    keep_alive_thread: Option<JoinHandle<()>>,
    pedal_thread: Option<JoinHandle<()>>,
}

impl BrakeEcu {
    /// 用已分离的总线适配器与踏板源启动网关
    ///
    /// 启动顺序：两个 TX 线程与指令 RX 线程先起，随即发送一条
    /// `from_percent(0)` 帧把执行器带到配置零点，最后再启动
    /// 保活与踏板采样线程。
    ///
    /// # Errors
    /// - `DriverError::InvalidConfig`: 线程周期配置非法
    /// - `DriverError::Protocol`: 编码器构造失败（`max_dist <= min_dist`），
    ///   不可恢复，进程拒绝启动
    pub fn new<R, CT, AT, P>(
        command_rx: R,
        command_tx_adapter: CT,
        actuator_tx_adapter: AT,
        pedal: P,
        encoder: BrakeEncoder,
        config: EcuConfig,
    ) -> Result<Self, DriverError>
    where
        R: RxAdapter + 'static,
        CT: TxAdapter + 'static,
        AT: TxAdapter + 'static,
        P: PedalSource + 'static,
    {
        config.validate()?;

        let ctx = Arc::new(EcuContext::new(encoder));
        let is_running = Arc::new(AtomicBool::new(true));

        // 每条总线一个帧通道，TX 端单线程独占
        let (actuator_tx, actuator_rx) = crossbeam_channel::bounded::<BusFrame>(64);
        let (command_tx, command_rx_chan) = crossbeam_channel::bounded::<BusFrame>(64);

        let running_clone = is_running.clone();
        let actuator_tx_thread = spawn(move || {
            tx_loop(actuator_tx_adapter, actuator_rx, running_clone);
        });

        let running_clone = is_running.clone();
        let command_tx_thread = spawn(move || {
            tx_loop(command_tx_adapter, command_rx_chan, running_clone);
        });

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let actuator_tx_clone = actuator_tx.clone();
        let rx_thread = spawn(move || {
            rx_loop(command_rx, ctx_clone, actuator_tx_clone, running_clone);
        });

        // 上电先发一条零点指令，把执行器带到配置的起始位置
        {
            let boot_frame = {
                let mut encoder = ctx.encoder.lock().map_err(|_| DriverError::PoisonedLock)?;
                encoder.from_percent(0)
            };
            actuator_tx
                .send(boot_frame)
                .map_err(|_| DriverError::ChannelClosed)?;
            info!("Boot frame sent, actuator commanded to configured zero point");
        }

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let actuator_tx_clone = actuator_tx.clone();
        let keep_alive_period = Duration::from_millis(config.keep_alive_period_ms);
        let keep_alive_thread = spawn(move || {
            keep_alive_loop(
                ctx_clone,
                actuator_tx_clone,
                keep_alive_period,
                running_clone,
            );
        });

        let ctx_clone = ctx.clone();
        let running_clone = is_running.clone();
        let actuator_tx_clone = actuator_tx.clone();
        let command_tx_clone = command_tx.clone();
        let config_clone = config.clone();
        let pedal_thread = spawn(move || {
            pedal_loop(
                pedal,
                ctx_clone,
                actuator_tx_clone,
                command_tx_clone,
                config_clone,
                running_clone,
            );
        });

        info!(
            "Brake gateway started (keep-alive: {}ms, pedal: {}us, deadband: {}%)",
            config.keep_alive_period_ms, config.pedal_period_us, config.deadband_percent
        );

        Ok(Self {
            ctx,
            is_running,
            actuator_tx: ManuallyDrop::new(actuator_tx),
            command_tx: ManuallyDrop::new(command_tx),
            rx_thread: Some(rx_thread),
            actuator_tx_thread: Some(actuator_tx_thread),
            command_tx_thread: Some(command_tx_thread),
            keep_alive_thread: Some(keep_alive_thread),
            pedal_thread: Some(pedal_thread),
        })
    }

    /// 共享状态上下文（测试与监控用）
    pub fn context(&self) -> &Arc<EcuContext> {
        &self.ctx
    }

    /// 网关是否仍在运行（任一线程检测到致命错误后变为 false）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 检查线程健康状态
    ///
    /// 所有后台线程都存活且运行标志为真时返回 `true`。
    pub fn is_healthy(&self) -> bool {
        let threads_alive = [
            &self.rx_thread,
            &self.actuator_tx_thread,
            &self.command_tx_thread,
            &self.keep_alive_thread,
            &self.pedal_thread,
        ]
        .iter()
        .all(|t| t.as_ref().map(|h| !h.is_finished()).unwrap_or(false));

        threads_alive && self.is_running()
    }

    /// 当前下发的行程距离（诊断用）
    pub fn last_dist(&self) -> Result<u16, DriverError> {
        let encoder = self
            .ctx
            .encoder
            .lock()
            .map_err(|_| DriverError::PoisonedLock)?;
        Ok(encoder.last_dist())
    }
}

impl Drop for BrakeEcu {
    fn drop(&mut self) {
        // Release: 确保所有之前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        // 关键：必须在 join 之前真正 drop 掉 Sender，否则接收端不会 Disconnected
        unsafe {
            ManuallyDrop::drop(&mut self.actuator_tx);
            ManuallyDrop::drop(&mut self.command_tx);
        }

        let join_timeout = Duration::from_secs(2);

        for (name, handle) in [
            ("RX", self.rx_thread.take()),
            ("actuator TX", self.actuator_tx_thread.take()),
            ("command TX", self.command_tx_thread.take()),
            ("keep-alive", self.keep_alive_thread.take()),
            ("pedal", self.pedal_thread.take()),
        ] {
            if let Some(handle) = handle
                && handle.join_timeout(join_timeout).is_err()
            {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, join_timeout
                );
            }
        }
    }
}
