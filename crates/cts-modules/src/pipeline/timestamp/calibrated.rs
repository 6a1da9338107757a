//! VK_EXT_calibrated_timestamps: device and host time domains are checked
//! against `vkCmdWriteTimestamp`, the native host clocks and a fixed sleep.

use std::thread;
use std::time::Duration;

use ash::vk;
use cts_common::platform::HostClock;
use cts_core::{CtsError, TestGroup, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, create_command_pool, create_query_pool,
    end_command_buffer, submit_commands_and_wait,
};
use cts_vk::{BinaryCollection, Context, TestCase, TestInstance, VkCheck};
use tracing::debug;

use super::{check_timestamp_bits, checked_timestamp_mask};
use crate::registry::CaseBox;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

pub const BATCH_TIME_LIMIT_NS: u64 = NANOS_PER_SECOND;
pub const DEVIATION_ERROR_LIMIT_NS: u64 = 100 * NANOS_PER_MILLI;
pub const DEVIATION_WARNING_LIMIT_NS: u64 = 50 * NANOS_PER_MILLI;
pub const DEFAULT_TOLERANCE_NS: u64 = 100 * NANOS_PER_MILLI;
pub const SLEEP_NS: u64 = 200 * NANOS_PER_MILLI;

// ── Clock arithmetic ────────────────────────────────────────────────────────

/// Smallest distance between `a` and `b` on a clock that wraps at `mask`.
pub fn abs_diff_with_overflow(a: u64, b: u64, mask: u64) -> u64 {
    let c = a.abs_diff(b);
    if c == 0 {
        return 0;
    }
    let d = mask.wrapping_sub(c).wrapping_add(1);
    c.min(d)
}

/// Distance travelled from `before` to `after`, allowing one wrap at `mask`.
pub fn positive_diff_with_overflow(before: u64, after: u64, mask: u64) -> u64 {
    if before <= after {
        after - before
    } else {
        mask.wrapping_sub(before - after).wrapping_add(1)
    }
}

/// True if `middle` does not lie between `begin` and `end`; the range may
/// wrap around.
pub fn out_of_range(begin: u64, middle: u64, end: u64) -> bool {
    if begin <= end {
        middle < begin || middle > end
    } else {
        middle > end && middle < begin
    }
}

/// Convert a small device tick delta to nanoseconds.
pub fn device_nanoseconds(ticks: u64, timestamp_period: f32) -> Result<u64, CtsError> {
    if ticks > u64::from(u32::MAX) {
        return Err(CtsError::fatal(format!(
            "Number of device ticks too big for conversion to nanoseconds: {}",
            ticks
        )));
    }
    Ok((ticks as f64 * f64::from(timestamp_period)) as u64)
}

/// Convert host clock ticks at `frequency` Hz to nanoseconds.
pub fn host_nanoseconds(ticks: u64, frequency: u64) -> u64 {
    if frequency == NANOS_PER_SECOND {
        return ticks;
    }
    let secs = ticks / frequency;
    let nanos = ((ticks % frequency) * NANOS_PER_SECOND) / frequency;
    secs * NANOS_PER_SECOND + nanos
}

/// Grade the maximum deviation reported alongside a calibrated sample.
pub fn deviation_check(deviation: u64, domain_count: usize, quality: &mut Vec<String>) -> Result<(), CtsError> {
    if deviation > DEVIATION_ERROR_LIMIT_NS {
        return Err(CtsError::fatal("Calibrated maximum deviation too big"));
    }
    if deviation > DEVIATION_WARNING_LIMIT_NS {
        quality.push("Calibrated maximum deviation beyond desirable limits".to_string());
    } else if deviation == 0 && domain_count > 1 {
        quality.push("Calibrated maximum deviation reported as zero".to_string());
    }
    Ok(())
}

/// Turn a passing verdict with collected quality notes into a warning.
pub fn with_quality(status: TestStatus, quality: &[String]) -> TestStatus {
    if !status.is_pass() || quality.is_empty() {
        return status;
    }
    TestStatus::quality_warning(format!("Warnings found: {}", quality.join("; ")))
}

// ── Domains ─────────────────────────────────────────────────────────────────

pub fn domain_name(domain: vk::TimeDomainKHR) -> &'static str {
    match domain {
        vk::TimeDomainKHR::DEVICE => "Device Domain",
        vk::TimeDomainKHR::CLOCK_MONOTONIC => "Monotonic Clock",
        vk::TimeDomainKHR::CLOCK_MONOTONIC_RAW => "Raw Monotonic Clock",
        vk::TimeDomainKHR::QUERY_PERFORMANCE_COUNTER => "Query Performance Counter",
        _ => "Unknown Time Domain",
    }
}

pub fn host_clock(domain: vk::TimeDomainKHR) -> Option<HostClock> {
    match domain {
        vk::TimeDomainKHR::CLOCK_MONOTONIC => Some(HostClock::Monotonic),
        vk::TimeDomainKHR::CLOCK_MONOTONIC_RAW => Some(HostClock::MonotonicRaw),
        vk::TimeDomainKHR::QUERY_PERFORMANCE_COUNTER => Some(HostClock::QueryPerformanceCounter),
        _ => None,
    }
}

fn preferred_host_domains() -> &'static [vk::TimeDomainKHR] {
    if cfg!(windows) {
        &[vk::TimeDomainKHR::QUERY_PERFORMANCE_COUNTER]
    } else {
        &[vk::TimeDomainKHR::CLOCK_MONOTONIC_RAW, vk::TimeDomainKHR::CLOCK_MONOTONIC]
    }
}

/// Available domains that are also in `interesting`, ordered by value.
pub fn domain_subset(available: &[vk::TimeDomainKHR], interesting: &[vk::TimeDomainKHR]) -> Vec<vk::TimeDomainKHR> {
    let mut subset: Vec<_> = available
        .iter()
        .copied()
        .filter(|d| interesting.contains(d))
        .collect();
    subset.sort_by_key(|d| d.as_raw());
    subset.dedup();
    subset
}

// ── Cases ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratedTest {
    DeviceDomain,
    HostDomain,
    Calibration,
}

pub struct CalibratedTimestampCase {
    test: CalibratedTest,
}

impl CalibratedTimestampCase {
    pub fn new(test: CalibratedTest) -> Self {
        Self { test }
    }
}

impl TestCase for CalibratedTimestampCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        context.require_device_extension(ash::ext::calibrated_timestamps::NAME)
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        _binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let mask = checked_timestamp_mask(context)?;
        let instance_fn = ash::ext::calibrated_timestamps::Instance::new(context.entry(), context.instance());
        let available = unsafe {
            instance_fn.get_physical_device_calibrateable_time_domains(context.physical_device())
        }
        .vk_check("vkGetPhysicalDeviceCalibrateableTimeDomainsEXT")?;
        if available.is_empty() {
            return Err(CtsError::not_supported("No calibrateable time domains found"));
        }
        debug!("calibrateable time domains: {:?}", available);

        Ok(Box::new(CalibratedTimestampInstance {
            test: self.test,
            context,
            device_fn: ash::ext::calibrated_timestamps::Device::new(context.instance(), context.device()),
            device_domains: domain_subset(&available, &[vk::TimeDomainKHR::DEVICE]),
            host_domains: domain_subset(&available, preferred_host_domains()),
            mask,
            period: context.limits().timestamp_period,
            quality: Vec::new(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct Calibrated {
    timestamp: u64,
    deviation: u64,
}

struct CalibratedTimestampInstance<'a> {
    test: CalibratedTest,
    context: &'a Context,
    device_fn: ash::ext::calibrated_timestamps::Device,
    device_domains: Vec<vk::TimeDomainKHR>,
    host_domains: Vec<vk::TimeDomainKHR>,
    mask: u64,
    period: f32,
    quality: Vec<String>,
}

impl CalibratedTimestampInstance<'_> {
    fn sample(&mut self, domains: &[vk::TimeDomainKHR]) -> Result<Vec<Calibrated>, CtsError> {
        let infos: Vec<_> = domains
            .iter()
            .map(|d| vk::CalibratedTimestampInfoKHR::default().time_domain(*d))
            .collect();
        let (timestamps, deviation) = unsafe { self.device_fn.get_calibrated_timestamps(&infos) }
            .vk_check("vkGetCalibratedTimestampsEXT")?;
        deviation_check(deviation, domains.len(), &mut self.quality)?;

        domains
            .iter()
            .zip(timestamps)
            .map(|(domain, timestamp)| {
                if *domain == vk::TimeDomainKHR::DEVICE {
                    check_timestamp_bits(timestamp, self.mask)?;
                }
                Ok(Calibrated { timestamp, deviation })
            })
            .collect()
    }

    fn sample_one(&mut self, domain: vk::TimeDomainKHR) -> Result<Calibrated, CtsError> {
        self.sample(&[domain])?
            .into_iter()
            .next()
            .ok_or_else(|| CtsError::fatal("vkGetCalibratedTimestampsEXT returned no timestamps"))
    }

    fn require_device_domains(&self) -> Result<(), CtsError> {
        if self.device_domains.is_empty() {
            return Err(CtsError::not_supported("No suitable device time domains found"));
        }
        Ok(())
    }

    fn require_host_domains(&self) -> Result<(), CtsError> {
        if self.host_domains.is_empty() {
            return Err(CtsError::not_supported("No suitable host time domains found"));
        }
        Ok(())
    }

    /// The device domain must bracket a timestamp written by the GPU.
    fn device_domain_test(&mut self) -> Result<TestStatus, CtsError> {
        self.require_device_domains()?;
        let context = self.context;
        let device = context.device();
        let query_pool = create_query_pool(device, vk::QueryType::TIMESTAMP, 1)?;
        let cmd_pool = create_command_pool(
            device,
            context.universal_queue_family_index(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;

        for domain in self.device_domains.clone() {
            let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;
            begin_command_buffer(device, cmd)?;
            unsafe {
                device.cmd_reset_query_pool(cmd, query_pool.get(), 0, 1);
                device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, query_pool.get(), 0);
            }
            end_command_buffer(device, cmd)?;

            let before = self.sample_one(domain)?;
            submit_commands_and_wait(device, context.universal_queue(), cmd)?;
            let after = self.sample_one(domain)?;
            let diff = device_nanoseconds(
                positive_diff_with_overflow(before.timestamp, after.timestamp, self.mask),
                self.period,
            )?;

            let mut written = [0u64; 1];
            unsafe {
                device.get_query_pool_results(
                    query_pool.get(),
                    0,
                    &mut written,
                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                )
            }
            .vk_check("vkGetQueryPoolResults")?;
            check_timestamp_bits(written[0], self.mask)?;

            if diff > BATCH_TIME_LIMIT_NS {
                return Ok(TestStatus::fail(format!(
                    "{}: Batch of work took too long to execute",
                    domain_name(domain)
                )));
            }
            if out_of_range(before.timestamp, written[0], after.timestamp) {
                return Ok(TestStatus::fail(format!(
                    "{}: vkCmdWriteTimestamp() inconsistent with vkGetCalibratedTimestampsEXT()",
                    domain_name(domain)
                )));
            }
        }
        Ok(TestStatus::pass("Pass"))
    }

    /// Host domains must agree with the native clock they mirror.
    fn host_domain_test(&mut self) -> Result<TestStatus, CtsError> {
        self.require_host_domains()?;
        for domain in self.host_domains.clone() {
            let clock = host_clock(domain)
                .filter(|c| c.is_available())
                .ok_or_else(|| CtsError::fatal(format!("{} cannot be read on this host", domain_name(domain))))?;
            let frequency = clock
                .frequency()
                .ok_or_else(|| CtsError::fatal("Unable to get host clock frequency"))?;
            let read = || clock.now().ok_or_else(|| CtsError::fatal("Unable to read host clock"));

            let before = read()?;
            let calibrated = self.sample_one(domain)?;
            let after = read()?;
            let diff = host_nanoseconds(positive_diff_with_overflow(before, after, u64::MAX), frequency);

            if diff > BATCH_TIME_LIMIT_NS {
                return Ok(TestStatus::fail(format!(
                    "{}: Querying host domain took too long to execute",
                    domain_name(domain)
                )));
            }
            if out_of_range(before, calibrated.timestamp, after) {
                return Ok(TestStatus::fail(format!(
                    "{}: vkGetCalibratedTimestampsEXT() inconsistent with native host API",
                    domain_name(domain)
                )));
            }
        }
        Ok(TestStatus::pass("Pass"))
    }

    /// Both clocks of each device/host pair must advance by the slept time.
    fn calibration_test(&mut self) -> Result<TestStatus, CtsError> {
        self.require_device_domains()?;
        self.require_host_domains()?;

        for device_domain in self.device_domains.clone() {
            for host_domain in self.host_domains.clone() {
                let frequency = host_clock(host_domain)
                    .and_then(HostClock::frequency)
                    .ok_or_else(|| CtsError::fatal("Unable to get host clock frequency"))?;
                let domains = [device_domain, host_domain];

                let before = self.sample(&domains)?;
                thread::sleep(Duration::from_nanos(SLEEP_NS));
                let after = self.sample(&domains)?;

                let sleep_ticks = (SLEEP_NS as f64 / f64::from(self.period)) as u64;
                let expected = before[0].timestamp.wrapping_add(sleep_ticks) & self.mask;
                let device_diff = device_nanoseconds(
                    abs_diff_with_overflow(after[0].timestamp, expected, self.mask),
                    self.period,
                )?;
                let max_device_diff = DEFAULT_TOLERANCE_NS.max(before[0].deviation + after[0].deviation);
                if device_diff > max_device_diff {
                    return Ok(TestStatus::fail(format!(
                        "[{}] Device expected timestamp differs {} nanoseconds (expect value <= {})",
                        domain_name(device_domain),
                        device_diff,
                        max_device_diff
                    )));
                }

                let host_before = host_nanoseconds(before[1].timestamp, frequency);
                let host_after = host_nanoseconds(after[1].timestamp, frequency);
                let host_diff =
                    abs_diff_with_overflow(host_after, host_before.wrapping_add(SLEEP_NS), u64::MAX);
                let max_host_diff = DEFAULT_TOLERANCE_NS.max(before[1].deviation + after[1].deviation);
                if host_diff > max_host_diff {
                    return Ok(TestStatus::fail(format!(
                        "[{}] Host expected timestamp differs {} nanoseconds (expected value <= {})",
                        domain_name(host_domain),
                        host_diff,
                        max_host_diff
                    )));
                }
            }
        }
        Ok(TestStatus::pass("Pass"))
    }
}

impl TestInstance for CalibratedTimestampInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let status = match self.test {
            CalibratedTest::DeviceDomain => self.device_domain_test()?,
            CalibratedTest::HostDomain => self.host_domain_test()?,
            CalibratedTest::Calibration => self.calibration_test()?,
        };
        Ok(with_quality(status, &self.quality))
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group: TestGroup<CaseBox> = TestGroup::new("calibrated", "VK_EXT_calibrated_timestamps tests");
    for (name, test) in [
        ("dev_domain_test", CalibratedTest::DeviceDomain),
        ("host_domain_test", CalibratedTest::HostDomain),
        ("calibration_test", CalibratedTest::Calibration),
    ] {
        group.add_case(name, Box::new(CalibratedTimestampCase::new(test)));
    }
    group
}
