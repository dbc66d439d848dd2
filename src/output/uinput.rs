//! Virtual gamepad backed by `/dev/uinput`.

use super::{InputSink, PadAxis, PadButton, PadEvent, SinkError, AXIS_MAX, AXIS_MIN};
use crate::config::BridgeConfig;
use evdev_rs::enums::{EventCode, EventType, EV_ABS, EV_KEY, EV_SYN};
use evdev_rs::{
    AbsInfo, DeviceWrapper as _, EnableCodeData, InputEvent, TimeVal, UInputDevice, UninitDevice,
};
use tracing::{debug, info};

const BUS_USB: u16 = 0x03;
// pid.codes generic vendor
const VENDOR_ID: u16 = 0x1209;
const PRODUCT_ID: u16 = 0x7501;

const STICK_ABSINFO: AbsInfo = AbsInfo {
    value: 0,
    minimum: AXIS_MIN,
    maximum: AXIS_MAX,
    fuzz: 0,
    flat: 0,
    resolution: 0,
};

/// Stick axes every gamepad needs so consumers recognize the device, even in digital mode.
const BASE_AXES: [PadAxis; 4] = [
    PadAxis::LeftX,
    PadAxis::RightX,
    PadAxis::LeftY,
    PadAxis::RightY,
];

pub struct UinputSink {
    device: UInputDevice,
}

impl UinputSink {
    /// Creates the virtual device and declares every button and axis the bridge may emit.
    pub fn create(config: &BridgeConfig) -> Result<Self, SinkError> {
        let template = UninitDevice::new()
            .ok_or_else(|| SinkError::DeviceCreation("libevdev allocation failed".to_string()))?;
        template.set_name(&config.device_name);
        template.set_bustype(BUS_USB);
        template.set_vendor_id(VENDOR_ID);
        template.set_product_id(PRODUCT_ID);

        template.enable_event_type(&EventType::EV_KEY)?;
        for button in config.buttons.bound_buttons() {
            debug!("Declaring button {:?}", button);
            template.enable_event_code(&EventCode::EV_KEY(key_code(button)), None)?;
        }

        template.enable_event_type(&EventType::EV_ABS)?;
        let active = config.mode.axis_count();
        let axes = PadAxis::CHANNELS
            .iter()
            .take(active.max(BASE_AXES.len()))
            .copied();
        for axis in axes {
            debug!("Declaring axis {:?}", axis);
            template.enable_event_code(
                &EventCode::EV_ABS(abs_code(axis)),
                Some(EnableCodeData::AbsInfo(STICK_ABSINFO)),
            )?;
        }

        let device = UInputDevice::create_from_device(&template)?;
        info!(
            "Created virtual device '{}' ({:04x}:{:04x})",
            config.device_name, VENDOR_ID, PRODUCT_ID
        );
        Ok(Self { device })
    }

    fn write(&self, code: EventCode, value: i32) -> Result<(), SinkError> {
        let event = InputEvent::new(&TimeVal::new(0, 0), &code, value);
        self.device.write_event(&event)?;
        Ok(())
    }
}

impl InputSink for UinputSink {
    fn emit(&mut self, event: PadEvent) -> Result<(), SinkError> {
        match event {
            PadEvent::Button { button, pressed } => {
                self.write(EventCode::EV_KEY(key_code(button)), i32::from(pressed))
            }
            PadEvent::Axis { axis, value } => self.write(EventCode::EV_ABS(abs_code(axis)), value),
        }
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        self.write(EventCode::EV_SYN(EV_SYN::SYN_REPORT), 0)
    }
}

fn key_code(button: PadButton) -> EV_KEY {
    match button {
        PadButton::South => EV_KEY::BTN_SOUTH,
        PadButton::East => EV_KEY::BTN_EAST,
        PadButton::North => EV_KEY::BTN_NORTH,
        PadButton::West => EV_KEY::BTN_WEST,
        PadButton::LeftBumper => EV_KEY::BTN_TL,
        PadButton::RightBumper => EV_KEY::BTN_TR,
        PadButton::LeftTrigger => EV_KEY::BTN_TL2,
        PadButton::RightTrigger => EV_KEY::BTN_TR2,
        PadButton::Select => EV_KEY::BTN_SELECT,
        PadButton::Start => EV_KEY::BTN_START,
        PadButton::Mode => EV_KEY::BTN_MODE,
        PadButton::DPadUp => EV_KEY::BTN_DPAD_UP,
        PadButton::DPadDown => EV_KEY::BTN_DPAD_DOWN,
        PadButton::DPadLeft => EV_KEY::BTN_DPAD_LEFT,
        PadButton::DPadRight => EV_KEY::BTN_DPAD_RIGHT,
        PadButton::LeftThumb => EV_KEY::BTN_THUMBL,
        PadButton::RightThumb => EV_KEY::BTN_THUMBR,
    }
}

fn abs_code(axis: PadAxis) -> EV_ABS {
    match axis {
        PadAxis::LeftX => EV_ABS::ABS_X,
        PadAxis::LeftY => EV_ABS::ABS_Y,
        PadAxis::RightX => EV_ABS::ABS_RX,
        PadAxis::RightY => EV_ABS::ABS_RY,
        PadAxis::LeftTrigger => EV_ABS::ABS_Z,
        PadAxis::RightTrigger => EV_ABS::ABS_RZ,
    }
}
