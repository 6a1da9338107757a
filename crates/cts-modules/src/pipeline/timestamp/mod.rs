//! `vkCmdWriteTimestamp` tests: timestamps written after pipeline stages of
//! graphics, compute and transfer work must never decrease, must respect
//! `timestampValidBits`, and must behave across query resets and copies.

pub mod calibrated;
mod instances;

use ash::vk;
use cts_core::{CtsError, TestGroup, TestStatus};
use cts_vk::Context;

use crate::registry::CaseBox;
use instances::{
    ConsistentResultsCase, ResetBeforeCopyCase, TimestampCase, TwoCmdBuffersCase, Workload,
};

pub const MIN_TIMESTAMP_VALID_BITS: u32 = 36;
pub const MAX_TIMESTAMP_VALID_BITS: u32 = 64;
/// Queries in each timestamp pool.
pub const ENTRY_COUNT: u32 = 8;

// ── Valid bits ──────────────────────────────────────────────────────────────

pub fn check_valid_bits(valid_bits: u32, queue_family_index: u32) -> Result<(), CtsError> {
    if !(MIN_TIMESTAMP_VALID_BITS..=MAX_TIMESTAMP_VALID_BITS).contains(&valid_bits) {
        return Err(CtsError::VerificationFailed(format!(
            "Invalid value for timestampValidBits ({}) in queue index {}",
            valid_bits, queue_family_index
        )));
    }
    Ok(())
}

pub fn timestamp_mask(valid_bits: u32) -> u64 {
    if valid_bits >= MAX_TIMESTAMP_VALID_BITS {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    }
}

/// Bits above `timestampValidBits` must read as zero.
pub fn check_timestamp_bits(timestamp: u64, mask: u64) -> Result<(), CtsError> {
    if timestamp > mask {
        return Err(CtsError::VerificationFailed(format!(
            "Invalid device timestamp value 0x{:x} according to device timestamp mask 0x{:x}",
            timestamp, mask
        )));
    }
    Ok(())
}

pub(crate) fn universal_valid_bits(context: &Context) -> u32 {
    context
        .queue_family_properties()
        .get(context.universal_queue_family_index() as usize)
        .map(|p| p.timestamp_valid_bits)
        .unwrap_or(0)
}

pub(crate) fn require_timestamps(context: &Context) -> Result<(), CtsError> {
    if universal_valid_bits(context) == 0 {
        return Err(CtsError::not_supported(
            "Universal queue does not support timestamps",
        ));
    }
    Ok(())
}

/// Support check plus valid-bit validation; returns the timestamp mask of
/// the universal queue.
pub(crate) fn checked_timestamp_mask(context: &Context) -> Result<u64, CtsError> {
    require_timestamps(context)?;
    let bits = universal_valid_bits(context);
    check_valid_bits(bits, context.universal_queue_family_index())?;
    Ok(timestamp_mask(bits))
}

pub(crate) fn require_host_query_reset(context: &Context) -> Result<(), CtsError> {
    if !context.features().host_query_reset() {
        return Err(CtsError::not_supported(
            "Implementation doesn't support resetting queries from the host",
        ));
    }
    Ok(())
}

/// Geometry and tessellation stages need their device features.
pub fn require_stage_features(
    features: &vk::PhysicalDeviceFeatures,
    stages: &[vk::PipelineStageFlags],
) -> Result<(), CtsError> {
    use vk::PipelineStageFlags as S;
    for stage in stages {
        match *stage {
            S::GEOMETRY_SHADER if features.geometry_shader == vk::FALSE => {
                return Err(CtsError::not_supported("Geometry Shader Not Supported"));
            }
            S::TESSELLATION_CONTROL_SHADER | S::TESSELLATION_EVALUATION_SHADER
                if features.tessellation_shader == vk::FALSE =>
            {
                return Err(CtsError::not_supported("Tessellation Not Supported"));
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Oracles ─────────────────────────────────────────────────────────────────

/// One query result; `availability` is present when the results were
/// fetched with `VK_QUERY_RESULT_WITH_AVAILABILITY_BIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampValue {
    pub value: u64,
    pub availability: Option<u64>,
}

/// Timestamps in submission order must be available and non-decreasing.
pub fn verify_timestamps(values: &[TimestampValue]) -> TestStatus {
    for (first, later) in values.iter().enumerate() {
        for earlier in &values[..first] {
            if later.availability == Some(0) || earlier.availability == Some(0) {
                return TestStatus::fail("Timestamp query not available");
            }
            if later.value < earlier.value {
                return TestStatus::fail(
                    "Latter stage timestamp is smaller than the former stage timestamp.",
                );
            }
        }
    }
    TestStatus::pass("Timestamp increases steadily.")
}

/// After a host reset, a non-waiting read must return `VK_NOT_READY`,
/// leave the destination values untouched and report zero availability.
/// `after_reset` holds `(value, availability)` pairs read into a buffer
/// that was pre-filled with `original`.
pub fn verify_host_reset(
    not_ready: bool,
    original: &[u64],
    after_reset: &[[u64; 2]],
    mask: u64,
) -> Option<TestStatus> {
    if !not_ready {
        return Some(TestStatus::fail("QueryPoolResults incorrect reset"));
    }
    for (orig, [value, availability]) in original.iter().zip(after_reset) {
        if value & mask != *orig {
            return Some(TestStatus::fail("QueryPoolResults returned value was modified"));
        }
        if *availability != 0 {
            return Some(TestStatus::fail(
                "QueryPoolResults availability status is not zero",
            ));
        }
    }
    None
}

pub fn verify_reset_before_copy(availability: u64) -> TestStatus {
    if availability != 0 {
        TestStatus::fail("Availability bit nonzero after resetting query")
    } else {
        TestStatus::pass("Pass")
    }
}

/// A 32-bit read of a timestamp is the low half of the 64-bit read, or
/// saturates when the value does not fit.
pub fn verify_consistent_results(b32: u32, b64: u64, g32: u32, g64: u64) -> TestStatus {
    let max32 = u32::MAX as u64;
    let consistent = b32 == g32
        && b64 == g64
        && ((g64 & max32) == g32 as u64 || (g64 > max32 && g32 == u32::MAX));
    if consistent {
        TestStatus::pass("Pass")
    } else {
        TestStatus::fail(format!(
            "Results are inconsistent: B32=0x{:x} B64=0x{:x} G32=0x{:x} G64=0x{:x}",
            b32, b64, g32, g64
        ))
    }
}

// ── Naming ──────────────────────────────────────────────────────────────────

pub fn stage_name(stage: vk::PipelineStageFlags) -> Option<&'static str> {
    use vk::PipelineStageFlags as S;
    let name = match stage {
        S::TOP_OF_PIPE => "top_of_pipe_stage",
        S::DRAW_INDIRECT => "draw_indirect_stage",
        S::VERTEX_INPUT => "vertex_input_stage",
        S::VERTEX_SHADER => "vertex_shader_stage",
        S::TESSELLATION_CONTROL_SHADER => "tessellation_control_shader_stage",
        S::TESSELLATION_EVALUATION_SHADER => "tessellation_evaluation_shader_stage",
        S::GEOMETRY_SHADER => "geometry_shader_stage",
        S::FRAGMENT_SHADER => "fragment_shader_stage",
        S::EARLY_FRAGMENT_TESTS => "early_fragment_tests_stage",
        S::LATE_FRAGMENT_TESTS => "late_fragment_tests_stage",
        S::COLOR_ATTACHMENT_OUTPUT => "color_attachment_output_stage",
        S::COMPUTE_SHADER => "compute_shader_stage",
        S::TRANSFER => "transfer_stage",
        S::HOST => "host_stage",
        S::ALL_GRAPHICS => "all_graphics_stage",
        S::ALL_COMMANDS => "all_commands_stage",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    CopyBuffer,
    CopyImage,
    BlitImage,
    CopyBufferToImage,
    CopyImageToBuffer,
    UpdateBuffer,
    FillBuffer,
    ClearColorImage,
    ClearDepthStencilImage,
    ResolveImage,
    CopyQueryPoolResults,
}

impl TransferMethod {
    pub const ALL: [TransferMethod; 11] = [
        TransferMethod::CopyBuffer,
        TransferMethod::CopyImage,
        TransferMethod::BlitImage,
        TransferMethod::CopyBufferToImage,
        TransferMethod::CopyImageToBuffer,
        TransferMethod::UpdateBuffer,
        TransferMethod::FillBuffer,
        TransferMethod::ClearColorImage,
        TransferMethod::ClearDepthStencilImage,
        TransferMethod::ResolveImage,
        TransferMethod::CopyQueryPoolResults,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransferMethod::CopyBuffer => "copy_buffer_method",
            TransferMethod::CopyImage => "copy_image_method",
            TransferMethod::BlitImage => "blit_image_method",
            TransferMethod::CopyBufferToImage => "copy_buffer_to_image_method",
            TransferMethod::CopyImageToBuffer => "copy_image_to_buffer_method",
            TransferMethod::UpdateBuffer => "update_buffer_method",
            TransferMethod::FillBuffer => "fill_buffer_method",
            TransferMethod::ClearColorImage => "clear_color_image_method",
            TransferMethod::ClearDepthStencilImage => "clear_depth_stencil_image_method",
            TransferMethod::ResolveImage => "resolve_image_method",
            TransferMethod::CopyQueryPoolResults => "copy_query_pool_results_method",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimestampParams {
    pub stages: Vec<vk::PipelineStageFlags>,
    pub in_render_pass: bool,
    pub host_query_reset: bool,
    pub flags: vk::QueryResultFlags,
}

impl TimestampParams {
    pub fn new(stages: &[vk::PipelineStageFlags], in_render_pass: bool, flags: vk::QueryResultFlags) -> Self {
        Self {
            stages: stages.to_vec(),
            in_render_pass,
            host_query_reset: false,
            flags,
        }
    }

    pub fn with_availability(&self) -> bool {
        self.flags.contains(vk::QueryResultFlags::WITH_AVAILABILITY)
    }

    fn stage_prefix(&self) -> String {
        self.stages
            .iter()
            .filter(|s| **s != vk::PipelineStageFlags::TOP_OF_PIPE)
            .filter_map(|s| stage_name(*s))
            .map(|s| format!("{}_", s))
            .collect()
    }

    fn suffix(&self) -> String {
        let mut out = String::new();
        if self.host_query_reset {
            out.push_str("_host_query_reset");
        }
        if self.with_availability() {
            out.push_str("_with_availability_bit");
        }
        out
    }

    /// `<stages>_in_render_pass` or `<stages>_out_of_render_pass`, plus the
    /// host reset and availability suffixes.
    pub fn name(&self) -> String {
        let place = if self.in_render_pass {
            "in_render_pass"
        } else {
            "out_of_render_pass"
        };
        format!("{}{}{}", self.stage_prefix(), place, self.suffix())
    }

    pub fn transfer_name(&self, method: TransferMethod) -> String {
        format!("{}with_{}{}", self.stage_prefix(), method.name(), self.suffix())
    }
}

// ── Groups ──────────────────────────────────────────────────────────────────

fn main_flags() -> [vk::QueryResultFlags; 2] {
    let base = vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT;
    [base, base | vk::QueryResultFlags::WITH_AVAILABILITY]
}

fn add_graphics_variants(
    group: &mut TestGroup<CaseBox>,
    stages: &[vk::PipelineStageFlags],
    workload: Workload,
) {
    for flags in main_flags() {
        for (in_render_pass, host_query_reset) in [(true, false), (false, false), (false, true), (true, true)] {
            let mut params = TimestampParams::new(stages, in_render_pass, flags);
            params.host_query_reset = host_query_reset;
            group.add_case(
                params.name(),
                Box::new(TimestampCase::new(params, workload)),
            );
        }
    }
}

fn basic_graphics_tests() -> TestGroup<CaseBox> {
    use vk::PipelineStageFlags as S;
    let mut group: TestGroup<CaseBox> = TestGroup::new(
        "basic_graphics_tests",
        "Record timestamp in different pipeline stages of basic graphics tests",
    );
    let pairs = [
        S::VERTEX_INPUT,
        S::VERTEX_SHADER,
        S::FRAGMENT_SHADER,
        S::EARLY_FRAGMENT_TESTS,
        S::LATE_FRAGMENT_TESTS,
        S::COLOR_ATTACHMENT_OUTPUT,
        S::ALL_GRAPHICS,
        S::ALL_COMMANDS,
    ];
    for stage in pairs {
        add_graphics_variants(&mut group, &[S::TOP_OF_PIPE, stage], Workload::Graphics);
    }
    let triples = [
        [S::VERTEX_SHADER, S::FRAGMENT_SHADER, S::LATE_FRAGMENT_TESTS],
        [S::VERTEX_INPUT, S::EARLY_FRAGMENT_TESTS, S::COLOR_ATTACHMENT_OUTPUT],
    ];
    for stages in triples {
        add_graphics_variants(&mut group, &stages, Workload::Graphics);
    }
    group
}

fn advanced_graphics_tests() -> TestGroup<CaseBox> {
    use vk::PipelineStageFlags as S;
    let mut group: TestGroup<CaseBox> = TestGroup::new(
        "advanced_graphics_tests",
        "Record timestamp in different pipeline stages of advanced graphics tests",
    );
    let stages = [
        S::DRAW_INDIRECT,
        S::TESSELLATION_CONTROL_SHADER,
        S::TESSELLATION_EVALUATION_SHADER,
        S::GEOMETRY_SHADER,
    ];
    for stage in stages {
        add_graphics_variants(&mut group, &[S::TOP_OF_PIPE, stage], Workload::AdvancedGraphics);
    }
    group
}

fn basic_compute_tests() -> TestGroup<CaseBox> {
    use vk::PipelineStageFlags as S;
    let mut group: TestGroup<CaseBox> = TestGroup::new("basic_compute_tests", "Record timestamp for compute stages");
    for stages in [[S::TOP_OF_PIPE, S::COMPUTE_SHADER], [S::TOP_OF_PIPE, S::ALL_COMMANDS]] {
        for flags in main_flags() {
            let mut params = TimestampParams::new(&stages, false, flags);
            group.add_case(params.name(), Box::new(TimestampCase::new(params.clone(), Workload::Compute)));
            params.host_query_reset = true;
            group.add_case(params.name(), Box::new(TimestampCase::new(params, Workload::Compute)));
        }
    }
    group
}

fn transfer_tests() -> TestGroup<CaseBox> {
    use vk::PipelineStageFlags as S;
    let mut group: TestGroup<CaseBox> = TestGroup::new("transfer_tests", "Record timestamp for transfer stages");
    for stages in [[S::TOP_OF_PIPE, S::TRANSFER], [S::TOP_OF_PIPE, S::HOST]] {
        for method in TransferMethod::ALL {
            for flags in main_flags() {
                let mut params = TimestampParams::new(&stages, false, flags);
                group.add_case(
                    params.transfer_name(method),
                    Box::new(TimestampCase::new(params.clone(), Workload::Transfer(method))),
                );
                params.host_query_reset = true;
                group.add_case(
                    params.transfer_name(method),
                    Box::new(TimestampCase::new(params, Workload::Transfer(method))),
                );
            }
        }
    }
    group
}

fn misc_tests() -> TestGroup<CaseBox> {
    let mut group: TestGroup<CaseBox> = TestGroup::new(
        "misc_tests",
        "Misc tests that can not be categorized to other group.",
    );
    let misc_flags = [
        vk::QueryResultFlags::WAIT,
        vk::QueryResultFlags::WAIT | vk::QueryResultFlags::WITH_AVAILABILITY,
    ];
    let suffixes = ["", "_with_availability_bit"];
    let top = [vk::PipelineStageFlags::TOP_OF_PIPE];

    for ((timestamp_flags, copy_flags), suffix) in main_flags().into_iter().zip(misc_flags).zip(suffixes) {
        for host_query_reset in [false, true] {
            let reset = if host_query_reset { "_host_query_reset" } else { "" };

            let mut params = TimestampParams::new(&top, false, timestamp_flags);
            params.host_query_reset = host_query_reset;
            group.add_case(
                format!("timestamp_only{}{}", reset, suffix),
                Box::new(TimestampCase::new(params, Workload::None)),
            );

            for (level, level_name) in [
                (vk::CommandBufferLevel::PRIMARY, "primary"),
                (vk::CommandBufferLevel::SECONDARY, "secondary"),
            ] {
                group.add_case(
                    format!("two_cmd_buffers_{}{}{}", level_name, reset, suffix),
                    Box::new(TwoCmdBuffersCase::new(level, host_query_reset, copy_flags)),
                );
            }
        }
    }
    group.add_case("reset_query_before_copy", Box::new(ResetBeforeCopyCase));
    group.add_case("consistent_results", Box::new(ConsistentResultsCase));
    group
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group: TestGroup<CaseBox> = TestGroup::new("timestamp", "timestamp tests");
    group.add_child(basic_graphics_tests());
    group.add_child(advanced_graphics_tests());
    group.add_child(basic_compute_tests());
    group.add_child(transfer_tests());
    group.add_child(calibrated::create_tests());
    group.add_child(misc_tests());
    group
}
