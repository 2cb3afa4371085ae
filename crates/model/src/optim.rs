use ndarray::Array1;

/// Adam over a weight vector and a scalar bias.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    m_weights: Array1<f32>,
    v_weights: Array1<f32>,
    m_bias: f32,
    v_bias: f32,
}

impl Adam {
    pub fn new(learning_rate: f32, width: usize) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m_weights: Array1::zeros(width),
            v_weights: Array1::zeros(width),
            m_bias: 0.0,
            v_bias: 0.0,
        }
    }

    pub fn update(&mut self, weights: &mut Array1<f32>, bias: &mut f32, grad_weights: &Array1<f32>, grad_bias: f32) {
        self.step = self.step.saturating_add(1);
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.step);
        let correction2 = 1.0 - b2.powi(self.step);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        self.m_weights = &self.m_weights * b1 + grad_weights * (1.0 - b1);
        self.v_weights = &self.v_weights * b2 + &grad_weights.mapv(|g| g * g) * (1.0 - b2);
        ndarray::Zip::from(weights)
            .and(&self.m_weights)
            .and(&self.v_weights)
            .for_each(|w, &m, &v| {
                let m_hat = m / correction1;
                let v_hat = v / correction2;
                *w -= lr * m_hat / (v_hat.sqrt() + eps);
            });

        self.m_bias = b1 * self.m_bias + (1.0 - b1) * grad_bias;
        self.v_bias = b2 * self.v_bias + (1.0 - b2) * grad_bias * grad_bias;
        let m_hat = self.m_bias / correction1;
        let v_hat = self.v_bias / correction2;
        *bias -= lr * m_hat / (v_hat.sqrt() + eps);
    }
}
